//! Editor state: open tabs, the active tab, cursor position and diff previews.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use beesto_core::files::{file_name, language_for_path};
use beesto_core::{FileNode, IgnoreLock as _, Result};
use beesto_sandbox::Sandbox;

/// One open file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorTab {
    /// Tab id, unique for the store's lifetime
    pub id: String,
    /// Project path of the file
    pub path: String,
    /// File name shown on the tab
    pub name: String,
    /// Editor language
    pub language: String,
    /// Buffer content
    pub content: String,
    /// Whether the buffer differs from what was last saved
    pub is_dirty: bool,
}

/// 1-based cursor location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Default for CursorPosition {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

/// A proposed replacement awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffPreview {
    /// File the proposal targets
    pub path: String,
    /// Proposed full content
    pub proposed: String,
}

#[derive(Debug, Default)]
struct EditorState {
    tabs: Vec<EditorTab>,
    active_tab_id: Option<String>,
    cursor: CursorPosition,
    diff: Option<DiffPreview>,
    next_tab: u64,
}

impl EditorState {
    fn tab_index(&self, tab_id: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == tab_id)
    }

    fn tab_for_path(&self, path: &str) -> Option<&EditorTab> {
        self.tabs.iter().find(|tab| tab.path == path)
    }

    /// Appends a tab and activates it.
    fn push_tab(
        &mut self,
        path: &str,
        language: String,
        content: String,
        is_dirty: bool,
    ) -> String {
        self.next_tab += 1;
        let id = format!("tab-{}", self.next_tab);
        self.tabs.push(EditorTab {
            id: id.clone(),
            path: path.to_owned(),
            name: file_name(path).to_owned(),
            language,
            content,
            is_dirty,
        });
        self.active_tab_id = Some(id.clone());
        id
    }

    fn cycle(&mut self, forward: bool) {
        let count = self.tabs.len();
        if count == 0 {
            return;
        }
        let current = self
            .active_tab_id
            .as_deref()
            .and_then(|active| self.tab_index(active));
        let next = match (current, forward) {
            (Some(index), true) => (index + 1) % count,
            (Some(index), false) => (index + count - 1) % count,
            (None, true) => 0,
            (None, false) => count - 1,
        };
        self.active_tab_id = Some(self.tabs[next].id.clone());
    }
}

/// Open tabs over the shared sandbox.
///
/// At most one tab exists per path. Mutations are applied under a single lock and
/// never span a sandbox call.
pub struct EditorStore {
    sandbox: Arc<Sandbox>,
    state: Mutex<EditorState>,
}

impl EditorStore {
    /// Creates an empty editor over `sandbox`.
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            state: Mutex::new(EditorState::default()),
        }
    }

    /// Opens `node` in a tab and activates it, returning the tab id.
    ///
    /// Directories are ignored. A file that already has a tab only activates it.
    /// Content comes from the node, or from the sandbox when the node carries none;
    /// a failed read opens the tab with empty content.
    pub async fn open_file(&self, node: &FileNode) -> Option<String> {
        if node.is_directory() {
            return None;
        }
        if let Some(id) = self.activate_path(&node.path) {
            return Some(id);
        }

        let content = match node.content.as_deref() {
            Some(content) if !content.is_empty() => content.to_owned(),
            _ => match self.sandbox.read_file(&node.path).await {
                Ok(content) => content,
                Err(error) => {
                    warn!("Failed to read file {}: {error}", node.path);
                    String::new()
                }
            },
        };

        let language = node
            .language
            .clone()
            .unwrap_or_else(|| language_for_path(&node.path).to_owned());
        let mut state = self.state.lock_ignore_poison();
        // Another caller may have opened the same path while we were reading.
        if let Some(existing) = state.tab_for_path(&node.path).map(|tab| tab.id.clone()) {
            state.active_tab_id = Some(existing.clone());
            return Some(existing);
        }
        Some(state.push_tab(&node.path, language, content, false))
    }

    fn activate_path(&self, path: &str) -> Option<String> {
        let mut state = self.state.lock_ignore_poison();
        let id = state.tab_for_path(path)?.id.clone();
        state.active_tab_id = Some(id.clone());
        Some(id)
    }

    /// Closes a tab. If it was active, the last remaining tab becomes active.
    pub fn close_tab(&self, tab_id: &str) -> bool {
        let mut state = self.state.lock_ignore_poison();
        let Some(index) = state.tab_index(tab_id) else {
            return false;
        };
        state.tabs.remove(index);
        if state.active_tab_id.as_deref() == Some(tab_id) {
            state.active_tab_id = state.tabs.last().map(|tab| tab.id.clone());
        }
        true
    }

    /// Closes the tab showing `path`, if any.
    pub fn close_path(&self, path: &str) -> bool {
        let tab_id = self
            .state
            .lock_ignore_poison()
            .tab_for_path(path)
            .map(|tab| tab.id.clone());
        tab_id.is_some_and(|id| self.close_tab(&id))
    }

    /// Activates a tab; unknown ids are ignored.
    pub fn set_active_tab(&self, tab_id: &str) -> bool {
        let mut state = self.state.lock_ignore_poison();
        if state.tab_index(tab_id).is_none() {
            return false;
        }
        state.active_tab_id = Some(tab_id.to_owned());
        true
    }

    /// The active tab.
    pub fn active_tab(&self) -> Option<EditorTab> {
        let state = self.state.lock_ignore_poison();
        let active = state.active_tab_id.as_deref()?;
        state.tabs.iter().find(|tab| tab.id == active).cloned()
    }

    /// All tabs in opening order.
    pub fn tabs(&self) -> Vec<EditorTab> {
        self.state.lock_ignore_poison().tabs.clone()
    }

    /// A tab by id.
    pub fn tab(&self, tab_id: &str) -> Option<EditorTab> {
        let state = self.state.lock_ignore_poison();
        state.tabs.iter().find(|tab| tab.id == tab_id).cloned()
    }

    /// The tab showing `path`.
    pub fn tab_for_path(&self, path: &str) -> Option<EditorTab> {
        self.state.lock_ignore_poison().tab_for_path(path).cloned()
    }

    /// Replaces a tab's buffer and marks it dirty. Nothing is written.
    pub fn update_tab_content(&self, tab_id: &str, content: impl Into<String>) -> bool {
        let mut state = self.state.lock_ignore_poison();
        let Some(index) = state.tab_index(tab_id) else {
            return false;
        };
        let tab = &mut state.tabs[index];
        tab.content = content.into();
        tab.is_dirty = true;
        true
    }

    /// Writes a tab's buffer to the sandbox.
    ///
    /// The dirty flag clears only if the buffer did not change while the write was
    /// in flight. Unknown tabs are a no-op.
    ///
    /// # Errors
    /// Returns the sandbox error; the tab stays dirty.
    pub async fn save_file(&self, tab_id: &str) -> Result<()> {
        let Some(tab) = self.tab(tab_id) else {
            return Ok(());
        };
        if let Err(error) = self.sandbox.write_file(&tab.path, &tab.content).await {
            warn!("Failed to save file {}: {error}", tab.path);
            return Err(error.into());
        }
        debug!("Saved {}", tab.path);

        let mut state = self.state.lock_ignore_poison();
        if let Some(index) = state.tab_index(tab_id) {
            let current = &mut state.tabs[index];
            if current.content == tab.content {
                current.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Activates the next tab, wrapping around.
    pub fn switch_to_next_tab(&self) {
        self.state.lock_ignore_poison().cycle(true);
    }

    /// Activates the previous tab, wrapping around.
    pub fn switch_to_previous_tab(&self) {
        self.state.lock_ignore_poison().cycle(false);
    }

    /// Records the cursor position.
    pub fn set_cursor_position(&self, line: u32, column: u32) {
        self.state.lock_ignore_poison().cursor = CursorPosition { line, column };
    }

    /// The last recorded cursor position.
    pub fn cursor_position(&self) -> CursorPosition {
        self.state.lock_ignore_poison().cursor
    }

    /// Shows a proposed replacement for `path`, replacing any open preview.
    pub fn open_diff(&self, path: &str, proposed: impl Into<String>) {
        self.state.lock_ignore_poison().diff = Some(DiffPreview {
            path: path.to_owned(),
            proposed: proposed.into(),
        });
    }

    /// The open preview.
    pub fn diff_preview(&self) -> Option<DiffPreview> {
        self.state.lock_ignore_poison().diff.clone()
    }

    /// Accepts the preview into the file's tab, opening one if needed.
    ///
    /// The tab becomes dirty and active; saving is left to the caller. Returns the
    /// tab id, or `None` when no preview was open.
    pub fn apply_diff(&self) -> Option<String> {
        let mut state = self.state.lock_ignore_poison();
        let preview = state.diff.take()?;
        if let Some(index) = state.tabs.iter().position(|tab| tab.path == preview.path) {
            let tab = &mut state.tabs[index];
            tab.content = preview.proposed;
            tab.is_dirty = true;
            let id = tab.id.clone();
            state.active_tab_id = Some(id.clone());
            return Some(id);
        }
        let language = language_for_path(&preview.path).to_owned();
        Some(state.push_tab(&preview.path, language, preview.proposed, true))
    }

    /// Discards the preview.
    pub fn reject_diff(&self) -> bool {
        self.state.lock_ignore_poison().diff.take().is_some()
    }

    /// Refreshes a clean tab after something else wrote `path`.
    ///
    /// Dirty tabs keep the user's edits. Returns whether a tab was refreshed.
    pub fn sync_from_disk(&self, path: &str, content: &str) -> bool {
        let mut state = self.state.lock_ignore_poison();
        match state.tabs.iter_mut().find(|tab| tab.path == path) {
            Some(tab) if !tab.is_dirty => {
                content.clone_into(&mut tab.content);
                true
            }
            _ => false,
        }
    }
}
