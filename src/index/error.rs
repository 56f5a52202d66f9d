//! Index error types
//!
//! Recoverable errors describe a single malformed tag, message or pattern and
//! leave the rest of the system untouched. `Integrity` errors indicate a bug
//! upstream of the call that reported them and must never be swallowed.

use crate::index::IndexId;
use thiserror::Error;

/// Errors that can occur in the index layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Tag string could not be parsed as `service-key:value`
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// A required list was empty
    #[error("Empty batch: {0}")]
    EmptyBatch(&'static str),

    /// Message field missing or malformed (e.g. empty join key)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Two tags in one batch share a (service, key) slot with different values
    #[error("Conflicting values for {service}-{key}: '{first}' and '{second}'")]
    ConflictingTags {
        service: String,
        key: String,
        first: String,
        second: String,
    },

    /// Service is already routed to another index
    #[error("Service '{service}' is bound to index '{bound}', not '{requested}'")]
    ServiceConflict {
        service: String,
        bound: IndexId,
        requested: IndexId,
    },

    /// Service registered twice for the same index in the catalog
    #[error("Service '{service}' already registered for index '{index}'")]
    DuplicateService { index: IndexId, service: String },

    /// Regex pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Internal consistency violated; never a user error
    #[error("Integrity violation: {0}")]
    Integrity(String),
}

impl IndexError {
    /// Build an integrity error and log it loudly
    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "index integrity violation");
        IndexError::Integrity(message)
    }

    /// Whether this error indicates a bug rather than bad input
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Integrity(_))
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
