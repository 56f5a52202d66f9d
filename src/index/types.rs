//! Core identifier types for the index layer
//!
//! All index internals operate on fixed-width hashed identifiers rather than
//! raw strings:
//! - `Tag`: hash of a canonical `service-key:value` string
//! - `Metric`: hash of a dotted metric name
//! - `Join`: hash of a join value (e.g. a hostname)
//!
//! Hashing is xxh3-64 over the raw UTF-8 bytes. Collisions at 64 bits are
//! accepted as negligible.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

macro_rules! hashed_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Hash a raw string into an identifier
            #[inline]
            pub fn hash(raw: &str) -> Self {
                Self(xxh3_64(raw.as_bytes()))
            }

            /// Raw 64-bit value
            #[inline]
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }
    };
}

hashed_identifier!(
    /// Identifier of a `service-key:value` tag
    Tag
);

hashed_identifier!(
    /// Identifier of a metric name
    Metric
);

hashed_identifier!(
    /// Identifier of a join value, the pivot between tags and metrics
    Join
);

impl Tag {
    /// Hash a tag from its three components
    pub fn from_parts(service: &str, key: &str, value: &str) -> Self {
        Self::hash(&format!("{}-{}:{}", service, key, value))
    }
}

/// A tag split into its `service`, `key` and `value` components
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedTag {
    pub service: String,
    pub key: String,
    pub value: String,
}

impl ParsedTag {
    pub fn new(
        service: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse a raw `service-key:value` string
    pub fn parse(raw: &str) -> crate::index::IndexResult<Self> {
        crate::query::parse_tag(raw)
            .map_err(|e| crate::index::IndexError::InvalidTag(e.to_string()))
    }

    /// Hashed identifier of this tag
    pub fn id(&self) -> Tag {
        Tag::from_parts(&self.service, &self.key, &self.value)
    }

    /// The `(service, key)` slot this tag occupies
    pub fn slot(&self) -> (&str, &str) {
        (&self.service, &self.key)
    }
}

impl fmt::Display for ParsedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.service, self.key, self.value)
    }
}

/// Names one of the indexes owned by the database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexId {
    /// Two-stage index keyed by join key name (e.g. "fqdn")
    Split(String),
    /// Direct tag → metric index
    Full,
    /// Trigram text index over metric names
    Text,
}

impl IndexId {
    pub fn split(name: impl Into<String>) -> Self {
        IndexId::Split(name.into())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, IndexId::Text)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexId::Split(name) => write!(f, "{}", name),
            IndexId::Full => write!(f, "full"),
            IndexId::Text => write!(f, "text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Metric::hash("host1.cpu.loadavg"), Metric::hash("host1.cpu.loadavg"));
        assert_ne!(Metric::hash("host1.cpu.loadavg"), Metric::hash("host2.cpu.loadavg"));
    }

    #[test]
    fn test_tag_from_parts_matches_canonical() {
        let tag = ParsedTag::new("servers", "dc", "us_west");
        assert_eq!(tag.to_string(), "servers-dc:us_west");
        assert_eq!(tag.id(), Tag::hash("servers-dc:us_west"));
        assert_eq!(tag.id(), Tag::from_parts("servers", "dc", "us_west"));
    }

    #[test]
    fn test_parse_roundtrip() {
        let tag = ParsedTag::parse("servers-status:live").unwrap();
        assert_eq!(tag.service, "servers");
        assert_eq!(tag.key, "status");
        assert_eq!(tag.value, "live");
        assert_eq!(tag.slot(), ("servers", "status"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ParsedTag::parse("servers").is_err());
        assert!(ParsedTag::parse("servers-status").is_err());
        assert!(ParsedTag::parse("servers-status:").is_err());
    }

    #[test]
    fn test_index_id_display() {
        assert_eq!(IndexId::split("fqdn").to_string(), "fqdn");
        assert_eq!(IndexId::Full.to_string(), "full");
        assert_eq!(IndexId::Text.to_string(), "text");
        assert!(IndexId::Text.is_text());
    }

    #[test]
    fn test_identifier_ordering_follows_value() {
        let mut ids = vec![Join(30), Join(10), Join(20)];
        ids.sort();
        assert_eq!(ids, vec![Join(10), Join(20), Join(30)]);
        assert_eq!(Join(255).to_string(), "00000000000000ff");
    }
}
