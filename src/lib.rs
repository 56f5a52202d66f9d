//! # Virtindex
//!
//! Tag to metric-name query engine. Producers describe machines and metrics
//! with `service-key:value` tags; consumers ask for every metric matching a
//! set of tags.
//!
//! ## Features
//!
//! - **Split indexes**: tags and metrics joined through a shared key (e.g. `fqdn`)
//! - **Full index**: tags attached directly to metrics
//! - **Text index**: regex matching over metric names, narrowed by trigrams
//! - **Lock-free reads**: queries run against immutable generations swapped
//!   in by materialization
//! - **Autocomplete**: services, keys and values from the Table of Contents
//!
//! ## Modules
//!
//! - [`index`]: Index structures, write buffer and service routing
//! - [`database`]: Owner of every index, ingestion and query resolution
//! - [`query`]: Tag and query-string parsing
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use virtindex::config::IndexSettings;
//! use virtindex::database::{Database, MetricsMessage, TagsMessage};
//!
//! let db = Database::new(IndexSettings::default()).unwrap();
//!
//! db.insert_tags(&TagsMessage {
//!     key: "fqdn".to_string(),
//!     value: "host1".to_string(),
//!     tags: vec!["servers-dc:us_west".to_string()],
//! }).unwrap();
//!
//! db.insert_metrics(&MetricsMessage {
//!     key: "fqdn".to_string(),
//!     value: "host1".to_string(),
//!     metrics: vec!["host1.cpu.loadavg".to_string()],
//! }).unwrap();
//!
//! db.materialize_indexes().unwrap();
//!
//! let metrics = db.query_str("virt.v1.servers-dc:us_west").unwrap();
//! assert_eq!(metrics, vec!["host1.cpu.loadavg"]);
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod index;
pub mod query;

// Re-export top-level types for convenience
pub use database::{
    CustomMessage, Database, DatabaseStats, IngestMessage, IngestOutcome, MetricsMessage,
    TagsMessage,
};

pub use index::{
    Catalog, IndexError, IndexId, IndexResult, IndexStats, MaterializeReport, Metric, ParsedTag,
    QueryIndex, Tag,
};

pub use query::{parse_query_string, parse_tag, QueryError, QueryResult, QUERY_PREFIX};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{ApiConfig, Config, ConfigError, IndexSettings, LoggingConfig};
