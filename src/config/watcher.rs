//! Content fixture watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::store::{MemoryStore, ResourceChange};

/// Monitors the content fixture and swaps it into a [`MemoryStore`].
///
/// Every reload that changed the tree yields one batch of changes.
pub struct FixtureWatcher {
    path: PathBuf,
    store: Arc<MemoryStore>,
    update_tx: mpsc::UnboundedSender<Vec<ResourceChange>>,
}

impl FixtureWatcher {
    /// Create a new FixtureWatcher.
    ///
    /// Returns the watcher and a receiver for change batches.
    pub fn new(
        path: &Path,
        store: Arc<MemoryStore>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<ResourceChange>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                store,
                update_tx,
            },
            update_rx,
        )
    }

    /// Re-read the fixture and forward the resulting changes.
    pub fn reload(&self) {
        reload(&self.path, &self.store, &self.update_tx);
    }

    /// Start watching the file in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let store = Arc::clone(&self.store);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Content fixture change detected, reloading");
                        reload(&path, &store, &tx);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Fixture watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, store: &MemoryStore, tx: &mpsc::UnboundedSender<Vec<ResourceChange>>) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read content fixture, keeping current tree");
            return;
        }
    };
    match store.replace_all(&content) {
        Ok(changes) if changes.is_empty() => {
            tracing::debug!("Content fixture unchanged");
        }
        Ok(changes) => {
            tracing::info!(changes = changes.len(), "Content fixture reloaded");
            let _ = tx.send(changes);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse content fixture, keeping current tree");
        }
    }
}
