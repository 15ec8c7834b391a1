//! Resource resolution engine: alias, vanity path and configured mapping
//! indexes over a pluggable content store.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod mapping;
pub mod observability;
pub mod resolver;
pub mod store;

pub use config::schema::ResolverConfig;
pub use error::{MappingError, ResolveError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use mapping::MappingTable;
pub use resolver::{RequestContext, Resolution, Resolver};
pub use store::{MemoryStore, ResourceStore};
