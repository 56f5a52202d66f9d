//! Query Language
//!
//! Parses the tag grammar shared by ingestion, queries and autocomplete:
//!
//! - **Parser**: strict `service-key:value` tags, relaxed partial tags,
//!   and `virt.v1.` query strings
//! - **Error**: query error types
//!
//! # Query Language
//!
//! ```text
//! virt.v1.<tag>.<tag>...
//! ```
//!
//! Tags under the same service are resolved together against the index the
//! service is bound to; results from every index are intersected.
//!
//! # Examples
//!
//! ```rust
//! use virtindex::query::parse_query_string;
//!
//! let by_service = parse_query_string("virt.v1.servers-dc:us_west.servers-status:live").unwrap();
//! assert_eq!(by_service["servers"].len(), 2);
//! ```

mod error;
mod parser;

pub use error::{QueryError, QueryResult};
pub use parser::{parse_partial_tag, parse_query_string, parse_tag, PartialTag, QUERY_PREFIX};
