//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResolverConfig (validated, immutable)
//!     → shared via Arc with the mapping table and HTTP surface
//!
//! On content change:
//!     watcher.rs detects fixture modification
//!     → MemoryStore::replace_all computes the change batch
//!     → MappingTable::on_change applies it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use watcher::FixtureWatcher;
pub use schema::{
    AliasConfig, ConfiguredTreeConfig, ContentConfig, ListenerConfig, LogFormat, MappingConfig,
    ObservabilityConfig, ResolverConfig, VanityConfig,
};
