//! Query error types
//!
//! Defines all error conditions that can occur during query parsing and resolution.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query or tag parsing failed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Index error during resolution
    #[error("Index error: {0}")]
    Index(#[from] crate::index::IndexError),
}

impl QueryError {
    /// Whether this error indicates a bug rather than bad input
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::Index(e) if e.is_fatal())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexError;

    #[test]
    fn test_error_display() {
        let err = QueryError::Parse("missing prefix".to_string());
        assert_eq!(err.to_string(), "Parse error: missing prefix");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_index_errors_keep_fatality() {
        let bad_input: QueryError = IndexError::InvalidTag("x".to_string()).into();
        assert!(!bad_input.is_fatal());

        let broken: QueryError = IndexError::Integrity("lost".to_string()).into();
        assert!(broken.is_fatal());
    }
}
