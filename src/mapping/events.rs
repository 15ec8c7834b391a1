//! Change notifications in and out of the mapping table.

use serde::Serialize;

pub use crate::store::change::{ChangeKind, ResourceChange};

/// Summary of what one change batch did to the mapping table.
///
/// Broadcast to subscribers whenever it is not empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingChange {
    /// The configured mapping tree was rebuilt.
    pub configured: bool,
    /// Paths whose alias contribution changed.
    pub alias_paths: Vec<String>,
    /// Paths whose vanity contribution changed.
    pub vanity_paths: Vec<String>,
}

impl MappingChange {
    pub fn is_empty(&self) -> bool {
        !self.configured && self.alias_paths.is_empty() && self.vanity_paths.is_empty()
    }
}
