//! Backing-store boundary.
//!
//! # Data Flow
//! ```text
//! Mapping engine
//!     → ResourceStore::get_resource / list_children   (tree walks)
//!     → ResourceStore::find_resources(query, SQL2)     (index population)
//!     → Resource { path, ValueMap }                    (decoded once here)
//! ```
//!
//! # Design Decisions
//! - The engine never owns persistence; it only reads through this trait
//! - Stores are injected explicitly (no global registry)
//! - Query failures are typed so callers can decide on fallback

pub mod change;
pub mod memory;
pub mod query;
pub mod resource;

pub use change::{ChangeKind, ResourceChange};
pub use memory::MemoryStore;
pub use query::{QueryError, QueryResult, Statement, SQL2};
pub use resource::{MultiValue, PropertyValue, Resource, ValueMap};

/// Iterator over query results.
pub type ResourceIter<'a> = Box<dyn Iterator<Item = Resource> + Send + 'a>;

/// Read interface of a pluggable backing store.
pub trait ResourceStore: Send + Sync {
    /// Fetch the resource at an absolute path.
    fn get_resource(&self, path: &str) -> Option<Resource>;

    /// Direct children of `parent`, in the store's natural order.
    fn list_children(&self, parent: &str) -> Vec<Resource>;

    /// Execute a query. Results may be produced lazily.
    fn find_resources(&self, query: &str, language: &str) -> QueryResult<ResourceIter<'_>>;
}
