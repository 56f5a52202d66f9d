//! Virtindex Index Structures
//!
//! Resolves `service-key:value` tags to metric names:
//!
//! - **SplitIndex**: two-stage `tag → join → metric` index, one per join key
//! - **FullIndex**: direct `tag → metric` index for custom tagging
//! - **TextIndex**: trigram postings over metric names with a regex filter
//! - **TableOfContents**: catalog of known tags, drives autocomplete only
//!
//! # Architecture
//!
//! ```text
//! insert ──► WriteBuffer (Mutex) ──► TableOfContents (counts, eagerly)
//!                 │
//!            materialize
//!                 ▼
//!     SplitIndex / FullIndex / TextIndex   (ArcSwap snapshots)
//!                 ▲
//! query  ─────────┘  load() once, no locks
//! ```
//!
//! Readers never wait on writers: every index publishes an immutable
//! snapshot and materialization replaces it wholesale.

mod buffer;
mod error;
mod full;
pub mod postings;
mod router;
mod split;
mod text;
mod toc;
mod types;

pub use buffer::{check_conflicts, FullStaging, Slot, SplitStaging, WriteBuffer};
pub use error::{IndexError, IndexResult};
pub use full::FullIndex;
pub use router::{Binding, DroppedTag, ServiceRouter};
pub use split::{SplitIndex, TagReport};
pub use text::{literal_trigrams, trigrams, TextIndex, Trigram};
pub use toc::{Catalog, TableOfContents};
pub use types::{IndexId, Join, Metric, ParsedTag, Tag};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Version information of a published snapshot
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GenerationInfo {
    /// Starts at 0 (empty) and increases on every materialization
    pub generation: u64,
    /// Time spent building the snapshot
    pub build_micros: u64,
    /// When the snapshot was published
    pub built_at: Option<DateTime<Utc>>,
}

impl GenerationInfo {
    /// Info for the generation following `self`, built since `started`
    pub(crate) fn next(&self, started: Instant) -> Self {
        Self {
            generation: self.generation + 1,
            build_micros: started.elapsed().as_micros() as u64,
            built_at: Some(Utc::now()),
        }
    }

    pub fn build_duration(&self) -> Duration {
        Duration::from_micros(self.build_micros)
    }
}

/// Result of materializing one index
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    pub index: String,
    pub generation: u64,
    /// Distinct keys in the new snapshot (tags, or trigrams for text)
    pub keys: usize,
    /// Documents added by this run (text index only)
    pub added: usize,
    pub build_micros: u64,
}

/// Statistics about one index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub index: String,
    pub kind: &'static str,
    pub generation: u64,
    pub build_micros: u64,
    pub built_at: Option<DateTime<Utc>>,
    /// Tags (split, full) or trigrams (text)
    pub keys: usize,
    /// Joins (split) or documents (text); zero for the full index
    pub nodes: usize,
    /// Total posting-list entries
    pub postings: usize,
}

/// Shared query capability of every index kind
///
/// Split and full indexes are queried by tag, the text index by trigram.
pub trait QueryIndex: Send + Sync {
    /// Term an index is queried by
    type Term;

    fn id(&self) -> &IndexId;

    /// Metrics matching every term, ascending by identifier
    fn query(&self, terms: &[Self::Term]) -> IndexResult<Vec<Metric>>;

    fn generation(&self) -> u64;

    fn stats(&self) -> IndexStats;
}
