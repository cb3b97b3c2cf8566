//! Editor and project-tree stores backed by the sandbox.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Debounced auto-save.
mod autosave;
/// Open tabs, cursor and diff preview.
mod editor;
/// Project tree state.
mod tree;

pub use autosave::AutoSaver;
pub use editor::{CursorPosition, DiffPreview, EditorStore, EditorTab};
pub use tree::{FileTreeStore, NewItem};
