//! HTTP inspection surface.
//!
//! # Data Flow
//! ```text
//! GET /resolve?path=..&url=..  → Resolver::resolve       → Resolution (JSON)
//! GET /map?path=..&url=..      → Resolver::all_mappings  → preferred + all mappings
//! GET /aliases?parent=..       → MappingTable::alias_map
//! GET /vanity                  → MappingTable::vanity_path_mappings
//! GET /entries                 → configured resolve and reverse map entries
//! GET /status                  → index readiness and counters
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
