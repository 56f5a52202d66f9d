//! Ingestion message shapes
//!
//! Front ends decode one of three shapes and hand it to the database:
//!
//! ```text
//! {"Key": "fqdn", "Value": "host1", "Metrics": ["host1.cpu.loadavg"]}   → insert_metrics
//! {"Key": "fqdn", "Value": "host1", "Tags": ["servers-dc:us_west"]}     → insert_tags
//! {"Tags": ["custom-team:db"], "Metrics": ["db1.qps"]}                  → insert_custom
//! ```
//!
//! Field names are accepted capitalized or lowercase. Unknown fields are
//! rejected so the untagged [`IngestMessage`] never guesses.

use crate::index::DroppedTag;
use serde::{Deserialize, Serialize};

/// Metrics owned by a join value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsMessage {
    /// Join key name, e.g. `fqdn`
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
    /// Join value, e.g. a hostname
    #[serde(rename = "Value", alias = "value")]
    pub value: String,
    #[serde(rename = "Metrics", alias = "metrics")]
    pub metrics: Vec<String>,
}

/// Tags describing a join value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagsMessage {
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
    #[serde(rename = "Value", alias = "value")]
    pub value: String,
    #[serde(rename = "Tags", alias = "tags")]
    pub tags: Vec<String>,
}

/// Tags attached directly to metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomMessage {
    #[serde(rename = "Tags", alias = "tags")]
    pub tags: Vec<String>,
    #[serde(rename = "Metrics", alias = "metrics")]
    pub metrics: Vec<String>,
}

/// Any of the three message shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngestMessage {
    Metrics(MetricsMessage),
    Tags(TagsMessage),
    Custom(CustomMessage),
}

impl IngestMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestMessage::Metrics(_) => "metrics",
            IngestMessage::Tags(_) => "tags",
            IngestMessage::Custom(_) => "custom",
        }
    }
}

/// Outcome of one accepted message
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Metrics newly staged (metrics messages) or tags accepted (tag messages)
    pub accepted: usize,
    /// Tags rejected individually
    pub dropped: Vec<DroppedTag>,
}

/// Per-message failure inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
}

/// Outcome of a batch of messages processed independently
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Tags dropped inside otherwise accepted messages
    pub dropped_tags: usize,
    pub errors: Vec<BatchError>,
}
