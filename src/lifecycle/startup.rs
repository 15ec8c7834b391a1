//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the content store from the configured fixture
//! - Create and initialize the mapping table
//! - Run the dispatcher that feeds store changes into the table
//!
//! # Design Decisions
//! - Fail fast: an unreadable fixture is fatal at startup, not on reload
//! - Change batches are applied one at a time, in arrival order

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::ResolverConfig;
use crate::mapping::MappingTable;
use crate::resolver::Resolver;
use crate::store::memory::FixtureError;
use crate::store::{MemoryStore, ResourceChange};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to load content fixture: {0}")]
    Fixture(#[from] FixtureError),
    #[error("Failed to watch content fixture: {0}")]
    Watch(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialized engine: store, mapping table and resolver.
pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub table: Arc<MappingTable>,
    pub resolver: Resolver,
}

/// Build and initialize the engine.
///
/// With background vanity initialization this returns before the vanity
/// index is ready.
pub fn build_engine(config: Arc<ResolverConfig>) -> Result<Engine, StartupError> {
    let store = match &config.content.fixture_path {
        Some(path) => {
            let store = MemoryStore::load_fixture(path)?;
            tracing::info!(path = ?path, "Content fixture loaded");
            store
        }
        None => {
            tracing::warn!("No content fixture configured, starting with an empty tree");
            MemoryStore::new()
        }
    };
    let store = Arc::new(store);

    let table = Arc::new(MappingTable::new(store.clone(), config));
    table.initialize();
    let resolver = Resolver::new(Arc::clone(&table));
    Ok(Engine {
        store,
        table,
        resolver,
    })
}

/// Apply change batches to `table` until the channel closes or shutdown fires.
pub fn spawn_change_dispatcher(
    table: Arc<MappingTable>,
    mut changes: mpsc::UnboundedReceiver<Vec<ResourceChange>>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                batch = changes.recv() => {
                    let Some(batch) = batch else { break };
                    let table = Arc::clone(&table);
                    match tokio::task::spawn_blocking(move || table.on_change(&batch)).await {
                        Ok(change) => tracing::info!(
                            configured = change.configured,
                            aliases = change.alias_paths.len(),
                            vanity = change.vanity_paths.len(),
                            "Mapping table updated"
                        ),
                        Err(e) => tracing::error!(error = %e, "Change dispatch failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Change dispatcher stopped");
    })
}
