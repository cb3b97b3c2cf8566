//! Tree and editor working over one sandbox.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::sync::Arc;

use beesto_editor::{EditorStore, FileTreeStore};
use beesto_sandbox::{MemoryBackend, Sandbox, SandboxBackend, starter_template};

async fn starter_project() -> (Arc<MemoryBackend>, Arc<Sandbox>) {
    let backend = Arc::new(MemoryBackend::new());
    let sandbox = Arc::new(Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>));
    sandbox.mount(&starter_template()).await.unwrap();
    (backend, sandbox)
}

#[tokio::test]
async fn open_edit_and_save_from_tree() {
    let (backend, sandbox) = starter_project().await;
    let tree = FileTreeStore::new(Arc::clone(&sandbox));
    let editor = EditorStore::new(Arc::clone(&sandbox));
    tree.refresh_tree().await;

    let node = tree.find_node("/src/app/page.tsx").unwrap();
    let tab_id = editor.open_file(&node).await.unwrap();
    let tab = editor.active_tab().unwrap();
    assert_eq!(tab.language, "typescript");
    assert!(!tab.is_dirty);

    let edited = "export default function Home() { return <main>Hi</main>; }\n";
    assert!(editor.update_tab_content(&tab_id, edited));
    editor.save_file(&tab_id).await.unwrap();

    assert_eq!(backend.file("src/app/page.tsx").as_deref(), Some(edited));
    assert!(!editor.tab(&tab_id).unwrap().is_dirty);
}

#[tokio::test]
async fn directories_do_not_open_tabs() {
    let (_, sandbox) = starter_project().await;
    let tree = FileTreeStore::new(Arc::clone(&sandbox));
    let editor = EditorStore::new(sandbox);
    tree.refresh_tree().await;

    let src = tree.find_node("/src").unwrap();
    assert!(editor.open_file(&src).await.is_none());
    assert!(editor.tabs().is_empty());
}

#[tokio::test]
async fn renamed_file_reopens_under_new_path() {
    let (backend, sandbox) = starter_project().await;
    let tree = FileTreeStore::new(Arc::clone(&sandbox));
    let editor = EditorStore::new(Arc::clone(&sandbox));
    tree.refresh_tree().await;

    let old = tree.find_node("/src/app/globals.css").unwrap();
    editor.open_file(&old).await.unwrap();
    let new_path = tree.rename_node(&old.path, "styles.css").await.unwrap();
    editor.close_path(&old.path);

    let renamed = tree.find_node(&new_path).unwrap();
    editor.open_file(&renamed).await.unwrap();

    assert_eq!(editor.tabs().len(), 1);
    assert_eq!(editor.active_tab().unwrap().path, "/src/app/styles.css");
    assert!(backend.exists("src/app/styles.css"));
    assert!(!backend.exists("src/app/globals.css"));
}
