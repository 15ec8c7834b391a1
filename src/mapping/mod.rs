//! Mapping engine.
//!
//! # Data Flow
//! ```text
//! ResourceStore ──paged scans──▶ AliasIndex        (parent → child → aliases)
//!               ──paged scans──▶ VanityPathIndex   (vanity key → entries, bloom filter)
//!               ──tree walk────▶ configured maps   (map root → resolve + reverse entries)
//!
//! ResourceChange batches ──▶ MappingTable::on_change ──▶ indexes
//!                                                   └──▶ broadcast MappingChange
//!
//! Resolver ──▶ MappingTable::resolve_entries(key) ──▶ MappingEntryIter
//!              (configured entries merged with vanity entries of the key and its ancestors)
//! ```
//!
//! # Design Decisions
//! - Every index is a rebuildable cache over the store; nothing is persisted
//! - Mutations are serialized per table; readers never block on them
//! - Store failures during index population degrade the index instead of failing it

pub mod alias;
pub mod bloom;
pub mod entry;
pub mod events;
pub mod iter;
pub mod paged;
pub mod table;
pub mod vanity;

pub use alias::AliasIndex;
pub use bloom::BloomFilter;
pub use entry::{EntrySummary, MappingEntry};
pub use events::MappingChange;
pub use iter::MappingEntryIter;
pub use paged::PagedQuery;
pub use table::{MappingTable, TableStatus};
pub use vanity::VanityPathIndex;
