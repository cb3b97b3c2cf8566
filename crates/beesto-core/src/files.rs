//! Project file model: tree nodes, language detection and structured file changes.

use serde::{Deserialize, Serialize};

/// Directory names never walked when building the project tree.
pub const SKIPPED_DIRECTORIES: [&str; 2] = ["node_modules", ".next"];

/// Whether a tree node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file
    File,
    /// Directory with children
    Directory,
}

/// A node in the project tree.
///
/// Paths are absolute within the project (`/src/app/page.tsx`); the sandbox boundary
/// strips the leading separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Stable identifier derived from the path
    pub id: String,
    /// Last path component
    pub name: String,
    /// Project-absolute path
    pub path: String,
    /// File or directory
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Editor language for files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Loaded file content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Child nodes for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    /// Creates a file node, detecting its language from the extension.
    pub fn file(path: &str, content: Option<String>) -> Self {
        let path = absolute_path(path);
        Self {
            id: node_id(&path),
            name: file_name(&path).to_owned(),
            language: Some(language_for_path(&path).to_owned()),
            path,
            kind: NodeKind::File,
            content,
            children: None,
        }
    }

    /// Creates a directory node.
    pub fn directory(path: &str, children: Vec<Self>) -> Self {
        let path = absolute_path(path);
        Self {
            id: node_id(&path),
            name: file_name(&path).to_owned(),
            path,
            kind: NodeKind::Directory,
            language: None,
            content: None,
            children: Some(children),
        }
    }

    /// Returns `true` for directories.
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Rewrites this node's path (and its descendants') after a rename of `old_prefix`.
    pub fn rebase(&mut self, old_prefix: &str, new_prefix: &str) {
        let rebased = self
            .path
            .strip_prefix(old_prefix)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .map(|rest| format!("{new_prefix}{rest}"));
        if let Some(path) = rebased {
            self.path = path;
            self.id = node_id(&self.path);
            self.name = file_name(&self.path).to_owned();
        }
        for child in self.children.iter_mut().flatten() {
            child.rebase(old_prefix, new_prefix);
        }
    }
}

/// Maps a file extension to the editor language identifier.
pub fn language_for_path(path: &str) -> &'static str {
    let extension = file_name(path)
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "json" => "json",
        "css" => "css",
        "scss" => "scss",
        "html" => "html",
        "md" => "markdown",
        "py" => "python",
        "prisma" => "prisma",
        "sql" => "sql",
        _ => "plaintext",
    }
}

/// Strips leading separators so the path is relative to the sandbox root.
pub fn relative_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Ensures a single leading separator.
pub fn absolute_path(path: &str) -> String {
    format!("/{}", relative_path(path))
}

/// Last component of a path.
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Parent directory of a project-absolute path; `/` for top-level entries.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_owned(),
        _ => "/".to_owned(),
    }
}

/// Tree node id for a path: `root-src-app-page.tsx`.
pub fn node_id(path: &str) -> String {
    let relative = relative_path(path);
    if relative.is_empty() {
        return "root".to_owned();
    }
    format!("root-{}", relative.replace('/', "-"))
}

/// Kind of change a plan step makes to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    /// Write a new file
    Create,
    /// Replace an existing file's content
    Update,
    /// Remove the file
    Delete,
}

/// One file mutation produced by an executed plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Project path of the affected file
    pub path: String,
    /// Full new content; ignored for deletes
    #[serde(default, alias = "newContent")]
    pub content: String,
    /// What to do with the file
    pub operation: ChangeOperation,
}

impl FileChange {
    /// Creates a change that writes a new file.
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            operation: ChangeOperation::Create,
        }
    }

    /// Creates a change that rewrites an existing file.
    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            operation: ChangeOperation::Update,
        }
    }

    /// Creates a change that deletes a file.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            operation: ChangeOperation::Delete,
        }
    }
}
