//! Project tree state mirrored from the sandbox.
//!
//! Structural edits (rename, delete, add) call the sandbox first and touch the
//! in-memory tree only after the call succeeded, so a failure leaves the tree as
//! it was.

use core::future::Future;
use core::pin::Pin;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use beesto_core::config::WorkspaceConfig;
use beesto_core::files::parent_path;
use beesto_core::{Error, FileNode, IgnoreLock as _, NodeKind, Result};
use beesto_sandbox::Sandbox;

/// Boxed future used by the recursive tree walk.
type NodesFuture<'walk> = Pin<Box<dyn Future<Output = Vec<FileNode>> + Send + 'walk>>;

/// An item being created in the tree UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Directory receiving the item
    pub parent_path: String,
    /// Whether a file or folder is being created
    pub kind: NodeKind,
}

#[derive(Debug, Default)]
struct TreeState {
    root_nodes: Vec<FileNode>,
    selected_path: Option<String>,
    expanded_paths: HashSet<String>,
    search_term: String,
    is_loading: bool,
    renaming_path: Option<String>,
    new_item: Option<NewItem>,
}

/// Whether `path` is `prefix` or lies below it.
fn is_within(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn find_in<'nodes>(nodes: &'nodes [FileNode], path: &str) -> Option<&'nodes FileNode> {
    nodes.iter().find_map(|node| {
        if node.path == path {
            Some(node)
        } else {
            find_in(node.children.as_deref().unwrap_or_default(), path)
        }
    })
}

fn find_in_mut<'nodes>(nodes: &'nodes mut [FileNode], path: &str) -> Option<&'nodes mut FileNode> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if let Some(children) = node.children.as_deref_mut()
            && let Some(found) = find_in_mut(children, path)
        {
            return Some(found);
        }
    }
    None
}

fn remove_in(nodes: &mut Vec<FileNode>, path: &str) -> bool {
    let before = nodes.len();
    nodes.retain(|node| node.path != path);
    if nodes.len() != before {
        return true;
    }
    nodes
        .iter_mut()
        .filter_map(|node| node.children.as_mut())
        .any(|children| remove_in(children, path))
}

fn collect_files(nodes: &[FileNode], paths: &mut Vec<String>) {
    for node in nodes {
        match node.kind {
            NodeKind::File => paths.push(node.path.clone()),
            NodeKind::Directory => {
                collect_files(node.children.as_deref().unwrap_or_default(), paths);
            }
        }
    }
}

/// Keeps nodes whose name matches `needle`, plus the ancestors of matches.
fn filter_nodes(nodes: &[FileNode], needle: &str) -> Vec<FileNode> {
    nodes
        .iter()
        .filter_map(|node| {
            let children = node
                .children
                .as_deref()
                .map(|children| filter_nodes(children, needle))
                .unwrap_or_default();
            let matches = node.name.to_lowercase().contains(needle);
            if !matches && children.is_empty() {
                return None;
            }
            let mut kept = node.clone();
            if node.children.is_some() && !matches {
                kept.children = Some(children);
            }
            Some(kept)
        })
        .collect()
}

/// The project tree and its UI state.
pub struct FileTreeStore {
    sandbox: Arc<Sandbox>,
    /// Directory names never walked
    skipped: Vec<String>,
    state: Mutex<TreeState>,
}

impl FileTreeStore {
    /// Creates an empty tree over `sandbox` skipping the default directories.
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self::from_config(sandbox, &WorkspaceConfig::default())
    }

    /// Creates an empty tree using the configured skip list.
    pub fn from_config(sandbox: Arc<Sandbox>, config: &WorkspaceConfig) -> Self {
        Self {
            sandbox,
            skipped: config.skipped_directories.clone(),
            state: Mutex::new(TreeState::default()),
        }
    }

    /// Rebuilds the whole tree from the sandbox.
    ///
    /// Unreadable files get empty content and unreadable directories no children;
    /// neither aborts the walk.
    pub async fn refresh_tree(&self) {
        self.state.lock_ignore_poison().is_loading = true;
        let nodes = self.build("/").await;
        info!("Refreshed project tree ({} top-level entries)", nodes.len());
        let mut state = self.state.lock_ignore_poison();
        state.root_nodes = nodes;
        state.is_loading = false;
    }

    fn build<'walk>(&'walk self, directory: &'walk str) -> NodesFuture<'walk> {
        Box::pin(async move {
            let entries = match self.sandbox.read_directory(directory).await {
                Ok(entries) => entries,
                Err(error) => {
                    warn!("Failed to read directory {directory}: {error}");
                    return Vec::new();
                }
            };

            let mut nodes = Vec::with_capacity(entries.len());
            for entry in entries {
                if self.skipped.iter().any(|skipped| *skipped == entry.name) {
                    continue;
                }
                let path = if directory == "/" {
                    format!("/{}", entry.name)
                } else {
                    format!("{directory}/{}", entry.name)
                };
                if entry.is_directory {
                    let children = self.build(&path).await;
                    nodes.push(FileNode::directory(&path, children));
                } else {
                    let content = match self.sandbox.read_file(&path).await {
                        Ok(content) => content,
                        Err(error) => {
                            debug!("Failed to read {path}: {error}");
                            String::new()
                        }
                    };
                    nodes.push(FileNode::file(&path, Some(content)));
                }
            }
            nodes
        })
    }

    /// Top-level nodes.
    pub fn root_nodes(&self) -> Vec<FileNode> {
        self.state.lock_ignore_poison().root_nodes.clone()
    }

    /// Whether a refresh is running.
    pub fn is_loading(&self) -> bool {
        self.state.lock_ignore_poison().is_loading
    }

    /// Renames the node at `old_path` within its directory, returning the new path.
    ///
    /// A renamed directory carries its descendants along.
    ///
    /// # Errors
    /// Returns an error for an invalid name or when the sandbox rename fails; the
    /// tree is unchanged in both cases.
    pub async fn rename_node(&self, old_path: &str, new_name: &str) -> Result<String> {
        if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".." {
            return Err(Error::InvalidPath(format!("Invalid file name: {new_name}")));
        }
        let parent = parent_path(old_path);
        let new_path = if parent == "/" {
            format!("/{new_name}")
        } else {
            format!("{parent}/{new_name}")
        };

        if let Err(error) = self.sandbox.rename(old_path, &new_path).await {
            warn!("Failed to rename {old_path}: {error}");
            return Err(error.into());
        }

        let mut state = self.state.lock_ignore_poison();
        if let Some(node) = find_in_mut(&mut state.root_nodes, old_path) {
            node.rebase(old_path, &new_path);
        }
        if let Some(selected) = state.selected_path.as_mut()
            && is_within(selected, old_path)
        {
            *selected = format!("{new_path}{}", &selected[old_path.len()..]);
        }
        let expanded: HashSet<String> = state
            .expanded_paths
            .drain()
            .map(|path| {
                if is_within(&path, old_path) {
                    format!("{new_path}{}", &path[old_path.len()..])
                } else {
                    path
                }
            })
            .collect();
        state.expanded_paths = expanded;
        state.renaming_path = None;
        Ok(new_path)
    }

    /// Deletes the node at `path` and everything below it.
    ///
    /// # Errors
    /// Returns the sandbox error; the tree is unchanged.
    pub async fn delete_node(&self, path: &str) -> Result<()> {
        if let Err(error) = self.sandbox.remove(path).await {
            warn!("Failed to delete {path}: {error}");
            return Err(error.into());
        }
        let mut state = self.state.lock_ignore_poison();
        remove_in(&mut state.root_nodes, path);
        if state
            .selected_path
            .as_deref()
            .is_some_and(|selected| is_within(selected, path))
        {
            state.selected_path = None;
        }
        state.expanded_paths.retain(|expanded| !is_within(expanded, path));
        Ok(())
    }

    /// Creates `node` in the sandbox and inserts it under `parent_path`.
    ///
    /// Directories are created empty; files are written with their content.
    ///
    /// # Errors
    /// Returns the sandbox error; the tree is unchanged.
    pub async fn add_node(&self, parent_path: &str, node: FileNode) -> Result<()> {
        let created = if node.is_directory() {
            self.sandbox.mkdir(&node.path).await
        } else {
            self.sandbox
                .write_file(&node.path, node.content.as_deref().unwrap_or_default())
                .await
        };
        if let Err(error) = created {
            warn!("Failed to add node {}: {error}", node.path);
            return Err(error.into());
        }

        let mut state = self.state.lock_ignore_poison();
        if parent_path == "/" {
            state.root_nodes.push(node);
        } else if let Some(parent) = find_in_mut(&mut state.root_nodes, parent_path) {
            parent.children.get_or_insert_with(Vec::new).push(node);
        } else {
            debug!("Parent {parent_path} not in tree; refresh to show {}", node.path);
        }
        state.new_item = None;
        Ok(())
    }

    /// Finds a node by path.
    pub fn find_node(&self, path: &str) -> Option<FileNode> {
        find_in(&self.state.lock_ignore_poison().root_nodes, path).cloned()
    }

    /// Paths of every file in the tree, depth first.
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_files(&self.state.lock_ignore_poison().root_nodes, &mut paths);
        paths
    }

    /// Selects a path, or clears the selection.
    pub fn set_selected_path(&self, path: Option<String>) {
        self.state.lock_ignore_poison().selected_path = path;
    }

    /// The selected path.
    pub fn selected_path(&self) -> Option<String> {
        self.state.lock_ignore_poison().selected_path.clone()
    }

    /// Expands a collapsed directory or collapses an expanded one.
    pub fn toggle_expanded(&self, path: &str) {
        let mut state = self.state.lock_ignore_poison();
        if !state.expanded_paths.remove(path) {
            state.expanded_paths.insert(path.to_owned());
        }
    }

    /// Whether a directory is expanded.
    pub fn is_expanded(&self, path: &str) -> bool {
        self.state.lock_ignore_poison().expanded_paths.contains(path)
    }

    /// Sets the search term used by [`Self::filtered_nodes`].
    pub fn set_search_term(&self, term: impl Into<String>) {
        self.state.lock_ignore_poison().search_term = term.into();
    }

    /// The search term.
    pub fn search_term(&self) -> String {
        self.state.lock_ignore_poison().search_term.clone()
    }

    /// The tree narrowed to case-insensitive name matches and their ancestors.
    ///
    /// A blank term returns the whole tree.
    pub fn filtered_nodes(&self) -> Vec<FileNode> {
        let state = self.state.lock_ignore_poison();
        let needle = state.search_term.trim().to_lowercase();
        if needle.is_empty() {
            return state.root_nodes.clone();
        }
        filter_nodes(&state.root_nodes, &needle)
    }

    /// Puts a node into rename mode.
    pub fn start_rename(&self, path: &str) {
        self.state.lock_ignore_poison().renaming_path = Some(path.to_owned());
    }

    /// Leaves rename mode.
    pub fn cancel_rename(&self) {
        self.state.lock_ignore_poison().renaming_path = None;
    }

    /// The node in rename mode.
    pub fn renaming_path(&self) -> Option<String> {
        self.state.lock_ignore_poison().renaming_path.clone()
    }

    /// Starts creating a file or folder under `parent_path`.
    pub fn start_new_item(&self, parent_path: &str, kind: NodeKind) {
        self.state.lock_ignore_poison().new_item = Some(NewItem {
            parent_path: parent_path.to_owned(),
            kind,
        });
    }

    /// Abandons item creation.
    pub fn cancel_new_item(&self) {
        self.state.lock_ignore_poison().new_item = None;
    }

    /// The item being created.
    pub fn new_item(&self) -> Option<NewItem> {
        self.state.lock_ignore_poison().new_item.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beesto_sandbox::{MemoryBackend, Operation, SandboxBackend};

    async fn tree_with(backend: MemoryBackend) -> (Arc<MemoryBackend>, FileTreeStore) {
        let backend = Arc::new(backend);
        let sandbox = Arc::new(Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>));
        let store = FileTreeStore::new(sandbox);
        store.refresh_tree().await;
        (backend, store)
    }

    fn project() -> MemoryBackend {
        MemoryBackend::new()
            .with_file("package.json", "{}")
            .with_file("src/app/page.tsx", "page")
            .with_file("src/components/Hero.tsx", "hero")
            .with_file("node_modules/react/index.js", "react")
            .with_file(".next/cache/x", "cache")
    }

    #[tokio::test]
    async fn test_refresh_skips_dependency_and_build_directories() {
        let (_, store) = tree_with(project()).await;

        assert!(!store.is_loading());
        assert_eq!(
            store.file_paths(),
            ["/package.json", "/src/app/page.tsx", "/src/components/Hero.tsx"]
        );
        let page = store.find_node("/src/app/page.tsx").unwrap();
        assert_eq!(page.content.as_deref(), Some("page"));
        assert_eq!(page.id, "root-src-app-page.tsx");
    }

    #[tokio::test]
    async fn test_unreadable_entries_degrade() {
        let backend = project();
        backend.fail_on(Operation::ReadDirectory, "src/components");
        backend.fail_on(Operation::Read, "package.json");
        let (_, store) = tree_with(backend).await;

        let components = store.find_node("/src/components").unwrap();
        assert_eq!(components.children.as_deref(), Some(&[][..]));
        let package = store.find_node("/package.json").unwrap();
        assert_eq!(package.content.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_rename_directory_rebases_descendants() {
        let (backend, store) = tree_with(project()).await;
        store.set_selected_path(Some("/src/components/Hero.tsx".to_owned()));
        store.toggle_expanded("/src/components");
        store.start_rename("/src/components");

        let new_path = store.rename_node("/src/components", "ui").await.unwrap();

        assert_eq!(new_path, "/src/ui");
        assert!(store.find_node("/src/ui/Hero.tsx").is_some());
        assert!(store.find_node("/src/components").is_none());
        assert_eq!(store.selected_path().as_deref(), Some("/src/ui/Hero.tsx"));
        assert!(store.is_expanded("/src/ui"));
        assert!(store.renaming_path().is_none());
        assert_eq!(backend.file("src/ui/Hero.tsx").as_deref(), Some("hero"));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_tree_untouched() {
        let (backend, store) = tree_with(project()).await;
        backend.fail_on(Operation::Rename, "src/app/page.tsx");
        let before = store.root_nodes();

        let result = store.rename_node("/src/app/page.tsx", "home.tsx").await;

        assert!(result.is_err());
        assert_eq!(store.root_nodes(), before);
        assert!(store.rename_node("/package.json", "a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_add() {
        let (backend, store) = tree_with(project()).await;
        store.set_selected_path(Some("/src/app/page.tsx".to_owned()));

        store.delete_node("/src/app").await.unwrap();
        assert!(store.find_node("/src/app/page.tsx").is_none());
        assert!(store.selected_path().is_none());
        assert!(!backend.exists("src/app"));

        store.start_new_item("/src", NodeKind::File);
        store
            .add_node("/src", FileNode::file("/src/index.ts", Some("export {}".to_owned())))
            .await
            .unwrap();
        store
            .add_node("/", FileNode::directory("/public", Vec::new()))
            .await
            .unwrap();

        assert!(store.find_node("/src/index.ts").is_some());
        assert!(store.find_node("/public").unwrap().is_directory());
        assert!(store.new_item().is_none());
        assert_eq!(backend.file("src/index.ts").as_deref(), Some("export {}"));
        assert!(backend.exists("public"));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_node() {
        let (backend, store) = tree_with(project()).await;
        backend.fail_on(Operation::Remove, "package.json");
        assert!(store.delete_node("/package.json").await.is_err());
        assert!(store.find_node("/package.json").is_some());
    }

    #[tokio::test]
    async fn test_search_keeps_ancestors() {
        let (_, store) = tree_with(project()).await;
        store.set_search_term("HERO");

        let filtered = store.filtered_nodes();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].path, "/src");
        let children = filtered[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "/src/components");

        store.set_search_term("  ");
        assert_eq!(store.filtered_nodes().len(), 2);
    }

    #[tokio::test]
    async fn test_ui_modes() {
        let (_, store) = tree_with(MemoryBackend::new()).await;
        store.toggle_expanded("/src");
        assert!(store.is_expanded("/src"));
        store.toggle_expanded("/src");
        assert!(!store.is_expanded("/src"));

        store.start_new_item("/", NodeKind::Directory);
        assert_eq!(store.new_item().unwrap().kind, NodeKind::Directory);
        store.cancel_new_item();
        assert!(store.new_item().is_none());

        store.start_rename("/a");
        store.cancel_rename();
        assert!(store.renaming_path().is_none());
    }
}
