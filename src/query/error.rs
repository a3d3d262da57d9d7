//! Query engine error types

use crate::index::IndexError;
use thiserror::Error;

/// Errors from parsing or executing a query
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query string failed to parse
    #[error("query parse error: {0}")]
    Parse(String),

    /// Referenced table is not in the catalog
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// Referenced column is neither declared nor synthetic
    #[error("no such column: {0}")]
    NoSuchColumn(String),

    /// Placeholder count does not match the bound parameters
    #[error("expected {expected} parameters, got {got}")]
    ParamCount { expected: usize, got: usize },

    /// Statement shape outside the supported subset
    #[error("unsupported query: {0}")]
    Unsupported(String),

    /// Index layer failure (type mismatches never surface here; they
    /// degrade the plan to a scan)
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            QueryError::NoSuchTable("User".into()).to_string(),
            "no such table: User"
        );
        assert_eq!(
            QueryError::ParamCount { expected: 2, got: 1 }.to_string(),
            "expected 2 parameters, got 1"
        );
    }
}
