//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::database::{BatchError, IngestOutcome};
use crate::index::MaterializeReport;

// ============================================
// INGEST DTOs
// ============================================

/// Single message ingest response
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Status: "ok" or "partial"
    pub status: String,
    /// Metrics staged or tags accepted
    pub accepted: usize,
    /// Tags rejected individually
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedTagDto>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        let status = if outcome.dropped.is_empty() { "ok" } else { "partial" };
        Self {
            status: status.to_string(),
            accepted: outcome.accepted,
            dropped: outcome
                .dropped
                .into_iter()
                .map(|d| DroppedTagDto {
                    tag: d.tag,
                    error: d.error.to_string(),
                })
                .collect(),
        }
    }
}

/// A tag that was not staged
#[derive(Debug, Serialize, Deserialize)]
pub struct DroppedTagDto {
    pub tag: String,
    pub error: String,
}

/// Batch ingest request
///
/// Messages stay undecoded so each one can fail on its own.
#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    pub messages: Vec<serde_json::Value>,
}

/// Batch ingest response
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    /// Status: "ok" or "partial"
    pub status: String,
    /// Number of messages accepted
    pub accepted: usize,
    /// Number of messages rejected
    pub rejected: usize,
    /// Tags dropped inside accepted messages
    pub dropped_tags: usize,
    /// Errors for rejected messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
}

// ============================================
// QUERY DTOs
// ============================================

/// Query string parameters
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    /// `virt.v1.` query string
    pub q: String,
}

/// Query response
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub metrics: Vec<String>,
    pub meta: QueryMeta,
}

/// Query execution metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryMeta {
    pub count: usize,
    pub execution_time_ms: u64,
}

/// Autocomplete parameters
#[derive(Debug, Deserialize)]
pub struct AutocompleteParams {
    /// Partial tag, optionally ending in `*`
    #[serde(default)]
    pub q: String,
}

/// Autocomplete response
#[derive(Debug, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    pub input: String,
    pub completions: Vec<String>,
}

// ============================================
// ADMIN DTOs
// ============================================

/// Materialization response
#[derive(Debug, Serialize)]
pub struct MaterializeResponse {
    pub status: String,
    pub indexes: Vec<MaterializeReport>,
    pub execution_time_ms: u64,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, starting or failed
    pub status: String,
    /// Generation of the text index, 0 until the first materialization
    pub generation: u64,
    /// Number of registered services
    pub services: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
    /// Integrity failure that stopped materialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
