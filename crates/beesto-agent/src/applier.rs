//! Applies step file changes to the sandbox and keeps the stores in sync.

use std::sync::Arc;

use tracing::{debug, info};

use beesto_core::files::parent_path;
use beesto_core::{ChangeOperation, FileChange, Result};
use beesto_editor::{EditorStore, FileTreeStore};
use beesto_sandbox::Sandbox;

/// Writes agent changes into the project.
///
/// Written files refresh their clean editor tabs, deleted files close theirs, and
/// the tree is rebuilt once per batch.
pub struct WorkspaceApplier {
    sandbox: Arc<Sandbox>,
    editor: Arc<EditorStore>,
    tree: Arc<FileTreeStore>,
}

impl WorkspaceApplier {
    /// Creates an applier over the shared stores.
    pub fn new(sandbox: Arc<Sandbox>, editor: Arc<EditorStore>, tree: Arc<FileTreeStore>) -> Self {
        Self {
            sandbox,
            editor,
            tree,
        }
    }

    /// The tree store kept in sync.
    pub fn tree(&self) -> &FileTreeStore {
        &self.tree
    }

    /// Applies `changes` in order, returning how many were applied.
    ///
    /// # Errors
    /// Stops at the first failing change and returns its error. Changes applied
    /// before it stay applied and the tree reflects them.
    pub async fn apply(&self, changes: &[FileChange]) -> Result<usize> {
        let mut applied = 0;
        let mut outcome = Ok(());
        for change in changes {
            if let Err(error) = self.apply_one(change).await {
                outcome = Err(error);
                break;
            }
            applied += 1;
        }
        if applied > 0 {
            self.tree.refresh_tree().await;
        }
        info!("Applied {applied}/{} file changes", changes.len());
        outcome.map(|()| applied)
    }

    async fn apply_one(&self, change: &FileChange) -> Result<()> {
        match change.operation {
            ChangeOperation::Create | ChangeOperation::Update => {
                let parent = parent_path(&change.path);
                if parent != "/" {
                    self.sandbox.mkdir(&parent).await?;
                }
                self.sandbox.write_file(&change.path, &change.content).await?;
                if self.editor.sync_from_disk(&change.path, &change.content) {
                    debug!("Refreshed open tab for {}", change.path);
                }
            }
            ChangeOperation::Delete => {
                self.sandbox.remove(&change.path).await?;
                self.editor.close_path(&change.path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beesto_core::FileNode;
    use beesto_sandbox::{MemoryBackend, Operation, SandboxBackend};

    struct Fixture {
        backend: Arc<MemoryBackend>,
        editor: Arc<EditorStore>,
        applier: WorkspaceApplier,
    }

    fn fixture(backend: MemoryBackend) -> Fixture {
        let backend = Arc::new(backend);
        let sandbox = Arc::new(Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>));
        let editor = Arc::new(EditorStore::new(Arc::clone(&sandbox)));
        let tree = Arc::new(FileTreeStore::new(Arc::clone(&sandbox)));
        let applier = WorkspaceApplier::new(sandbox, Arc::clone(&editor), tree);
        Fixture {
            backend,
            editor,
            applier,
        }
    }

    #[tokio::test]
    async fn test_writes_create_parents_and_refresh_tree() {
        let fixture = fixture(MemoryBackend::new());
        let changes = [FileChange::create("/src/components/Hero.tsx", "hero")];

        assert_eq!(fixture.applier.apply(&changes).await.unwrap(), 1);
        assert_eq!(fixture.backend.file("src/components/Hero.tsx").as_deref(), Some("hero"));
        assert_eq!(fixture.applier.tree().file_paths(), ["/src/components/Hero.tsx"]);
    }

    #[tokio::test]
    async fn test_open_tabs_follow_changes() {
        let fixture = fixture(
            MemoryBackend::new()
                .with_file("src/a.ts", "a0")
                .with_file("src/b.ts", "b0")
                .with_file("src/c.ts", "c0"),
        );
        let clean = fixture.editor.open_file(&FileNode::file("/src/a.ts", None)).await.unwrap();
        let dirty = fixture.editor.open_file(&FileNode::file("/src/b.ts", None)).await.unwrap();
        fixture.editor.open_file(&FileNode::file("/src/c.ts", None)).await.unwrap();
        fixture.editor.update_tab_content(&dirty, "b-local");

        let changes = [
            FileChange::update("/src/a.ts", "a1"),
            FileChange::update("/src/b.ts", "b1"),
            FileChange::delete("/src/c.ts"),
        ];
        fixture.applier.apply(&changes).await.unwrap();

        assert_eq!(fixture.editor.tab(&clean).unwrap().content, "a1");
        assert_eq!(fixture.editor.tab(&dirty).unwrap().content, "b-local");
        assert!(fixture.editor.tab_for_path("/src/c.ts").is_none());
        assert_eq!(fixture.backend.file("src/b.ts").as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let fixture = fixture(MemoryBackend::new());
        fixture.backend.fail_on(Operation::Write, "src/b.ts");
        let changes = [
            FileChange::create("/src/a.ts", "a"),
            FileChange::create("/src/b.ts", "b"),
            FileChange::create("/src/c.ts", "c"),
        ];

        assert!(fixture.applier.apply(&changes).await.is_err());
        assert!(fixture.backend.exists("src/a.ts"));
        assert!(!fixture.backend.exists("src/c.ts"));
        assert_eq!(fixture.applier.tree().file_paths(), ["/src/a.ts"]);
    }
}
