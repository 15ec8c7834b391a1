//! Error types of the mapping engine.
//!
//! Data defects (malformed aliases, vanity values, mapping cycles) are never
//! errors: they are logged and skipped where they occur. Only store failures
//! and store contract violations surface through these types.

use thiserror::Error;

use crate::store::QueryError;

/// Errors raised while building or querying the mapping indexes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The backing store failed to execute a query.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The backing store broke its ordering contract during a paged scan.
    #[error("Query implementation error: {0}")]
    QueryImplementation(String),

    /// A mapping pattern did not compile.
    #[error("Invalid mapping pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl MappingError {
    /// True when the store lacks a query capability, as opposed to breaking
    /// its contract or failing outright.
    pub fn is_recoverable_query_failure(&self) -> bool {
        matches!(
            self,
            MappingError::Query(
                QueryError::Syntax { .. }
                    | QueryError::Unsupported(_)
                    | QueryError::UnsupportedLanguage(_)
            )
        )
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors that escape a single resolve or map call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A store query failed during an on-demand lookup.
    #[error("Resolution failed: {0}")]
    Query(#[from] QueryError),

    /// The store broke its ordering contract.
    #[error("Query implementation error: {0}")]
    QueryImplementation(String),
}

impl From<MappingError> for ResolveError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Query(q) => ResolveError::Query(q),
            MappingError::QueryImplementation(msg) => ResolveError::QueryImplementation(msg),
            // Pattern defects are filtered out before lookups run.
            other => ResolveError::Query(QueryError::Store(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MappingError::QueryImplementation("page 2 went backwards".into());
        assert!(!err.is_recoverable_query_failure());
        assert_eq!(err.to_string(), "Query implementation error: page 2 went backwards");

        let err: MappingError = QueryError::Unsupported("FIRST".into()).into();
        assert!(err.is_recoverable_query_failure());
        assert_eq!(err.to_string(), "Unsupported query operation: FIRST");
    }

    #[test]
    fn test_store_failures_are_not_recoverable() {
        let err: MappingError = QueryError::Store("disk on fire".into()).into();
        assert!(!err.is_recoverable_query_failure());
        let resolve: ResolveError = err.into();
        assert!(matches!(resolve, ResolveError::Query(QueryError::Store(_))));
    }
}
