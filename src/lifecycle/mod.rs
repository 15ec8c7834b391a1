//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load fixture → MemoryStore → MappingTable::initialize → Resolver
//!     Spawn change dispatcher (watcher batches → MappingTable::on_change)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → HTTP server drains, dispatcher exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_engine, spawn_change_dispatcher, Engine, StartupError};
