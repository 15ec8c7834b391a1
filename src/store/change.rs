//! Change notifications emitted by a backing store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a resource change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// A single observed change to the content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub kind: ChangeKind,
    pub path: String,
}

impl ResourceChange {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Added,
            path: path.into(),
        }
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Changed,
            path: path.into(),
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            path: path.into(),
        }
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ChangeKind::Added => "ADDED",
            ChangeKind::Changed => "CHANGED",
            ChangeKind::Removed => "REMOVED",
        };
        write!(f, "{} {}", kind, self.path)
    }
}
