use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use beesto_core::IgnoreLock as _;
use beesto_core::config::EditorConfig;

use crate::editor::EditorStore;

/// Timer for one tab's next save.
struct PendingSave {
    /// Distinguishes a timer from the one that replaced it
    generation: u64,
    timer: JoinHandle<()>,
}

type PendingSaves = Arc<Mutex<HashMap<String, PendingSave>>>;

/// Debounced saving of edited tabs.
///
/// Each edit restarts the tab's timer; when a tab stays quiet for the whole delay
/// its current buffer is saved once. Dropping the saver cancels pending saves.
/// A disabled saver still applies edits but never saves.
pub struct AutoSaver {
    store: Arc<EditorStore>,
    delay: Duration,
    enabled: bool,
    /// Pending timer per tab id; a timer removes its own entry once it has run
    pending: PendingSaves,
    next_generation: AtomicU64,
}

impl AutoSaver {
    /// Creates an enabled saver waiting `delay` after the last edit.
    pub fn new(store: Arc<EditorStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            enabled: true,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Creates a saver from the editor settings.
    pub fn from_config(store: Arc<EditorStore>, config: &EditorConfig) -> Self {
        let mut saver = Self::new(store, config.auto_save_delay());
        saver.enabled = config.auto_save;
        saver
    }

    /// Whether edits schedule saves.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Applies an edit to a tab and schedules its save.
    pub fn edit(&self, tab_id: &str, content: impl Into<String>) -> bool {
        if !self.store.update_tab_content(tab_id, content) {
            return false;
        }
        self.schedule(tab_id);
        true
    }

    /// Restarts the save timer for a tab. Does nothing when disabled.
    pub fn schedule(&self, tab_id: &str) {
        if !self.enabled {
            return;
        }
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let id = tab_id.to_owned();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut timers = self.pending.lock_ignore_poison();
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            match store.save_file(&id).await {
                Ok(()) => debug!("Auto-saved tab {id}"),
                Err(error) => warn!("Auto-save failed for tab {id}: {error}"),
            }
            let mut timers = pending.lock_ignore_poison();
            if timers
                .get(&id)
                .is_some_and(|entry| entry.generation == generation)
            {
                timers.remove(&id);
            }
        });
        let entry = PendingSave { generation, timer };
        if let Some(previous) = timers.insert(tab_id.to_owned(), entry) {
            previous.timer.abort();
        }
    }

    /// Number of tabs with a save still scheduled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock_ignore_poison().len()
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock_ignore_poison().drain() {
            entry.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beesto_core::FileNode;
    use beesto_sandbox::{MemoryBackend, Sandbox, SandboxBackend};

    async fn setup() -> (Arc<MemoryBackend>, Arc<EditorStore>, String) {
        let backend = Arc::new(MemoryBackend::new().with_file("src/app/page.tsx", "v0"));
        let sandbox = Arc::new(Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>));
        let store = Arc::new(EditorStore::new(sandbox));
        let id = store
            .open_file(&FileNode::file("/src/app/page.tsx", None))
            .await
            .unwrap();
        (backend, store, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_saves_once() {
        let (backend, store, id) = setup().await;
        let saver = AutoSaver::new(Arc::clone(&store), Duration::from_millis(1000));

        for version in 1..=5 {
            saver.edit(&id, format!("v{version}"));
            sleep(Duration::from_millis(200)).await;
        }
        assert!(backend.writes().is_empty());

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(backend.writes(), ["src/app/page.tsx"]);
        assert_eq!(backend.file("src/app/page.tsx").as_deref(), Some("v5"));
        assert!(!store.tab(&id).unwrap().is_dirty);
        assert_eq!(saver.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_config_never_saves() {
        let (backend, store, id) = setup().await;
        let config = EditorConfig {
            auto_save: false,
            ..EditorConfig::default()
        };
        let saver = AutoSaver::from_config(Arc::clone(&store), &config);
        assert!(!saver.is_enabled());

        assert!(saver.edit(&id, "edited"));
        assert_eq!(saver.pending_count(), 0);

        sleep(Duration::from_secs(5)).await;
        assert!(backend.writes().is_empty());
        assert_eq!(store.tab(&id).unwrap().content, "edited");
        assert!(store.tab(&id).unwrap().is_dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_save() {
        let (backend, store, id) = setup().await;
        let saver = AutoSaver::new(Arc::clone(&store), Duration::from_millis(1000));
        saver.edit(&id, "unsaved");
        assert_eq!(saver.pending_count(), 1);
        drop(saver);

        sleep(Duration::from_secs(5)).await;
        assert!(backend.writes().is_empty());
        assert!(store.tab(&id).unwrap().is_dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tab_is_not_scheduled() {
        let (_, store, _) = setup().await;
        let saver = AutoSaver::new(store, Duration::from_millis(10));
        assert!(!saver.edit("tab-missing", "x"));
        assert_eq!(saver.pending_count(), 0);
    }
}
