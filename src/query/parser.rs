//! Tag and Query Parser
//!
//! Parses the tag grammar used by ingestion, queries and autocomplete.
//!
//! # Supported Syntax
//!
//! ```text
//! tag     := service '-' key ':' value
//! service := [A-Za-z0-9_]+
//! key     := [A-Za-z0-9_-]+
//! value   := any non-whitespace characters
//!
//! query   := 'virt.v1.' tag ('.' tag)*
//! ```
//!
//! # Examples
//!
//! ```text
//! servers-dc:us_west
//! virt.v1.servers-dc:us_west.servers-status:live
//! virt.v1.servers-dc:us_west.re-match:cpu.load.*
//! ```
//!
//! Tags are split on `.`; a segment that does not start a new
//! `service-key:` tag is glued back onto the previous one, so dotted values
//! and regex patterns survive.

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, recognize, rest},
    sequence::{pair, preceded, tuple},
    IResult,
};
use std::collections::BTreeMap;

use crate::index::ParsedTag;
use crate::query::error::{QueryError, QueryResult};

/// Prefix every query string must start with
pub const QUERY_PREFIX: &str = "virt.v1.";

/// A tag that may be incomplete, as typed into an autocomplete box
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialTag {
    /// Service portion (possibly partial, possibly empty)
    pub service: String,
    /// Key portion, present once a `-` has been typed
    pub key: Option<String>,
    /// Value portion, present once a `:` has been typed
    pub value: Option<String>,
}

/// Parse a complete `service-key:value` tag
pub fn parse_tag(input: &str) -> QueryResult<ParsedTag> {
    match all_consuming(tag_parts)(input.trim()) {
        Ok((_, (service, key, value))) => Ok(ParsedTag::new(service, key, value)),
        Err(_) => Err(QueryError::Parse(format!(
            "expected service-key:value, got '{}'",
            input
        ))),
    }
}

/// Relaxed parse accepting any prefix of a valid tag
pub fn parse_partial_tag(input: &str) -> QueryResult<PartialTag> {
    match all_consuming(partial_parts)(input.trim()) {
        Ok((_, (service, rest))) => {
            let (key, value) = match rest {
                Some((key, value)) => (Some(key.to_string()), value.map(str::to_string)),
                None => (None, None),
            };
            Ok(PartialTag {
                service: service.to_string(),
                key,
                value,
            })
        }
        Err(_) => Err(QueryError::Parse(format!("invalid partial tag '{}'", input))),
    }
}

/// Split a `virt.v1.` query string into service → raw tags
pub fn parse_query_string(input: &str) -> QueryResult<BTreeMap<String, Vec<String>>> {
    let body = match query_body(input.trim()) {
        Ok((_, body)) => body,
        Err(_) => {
            return Err(QueryError::Parse(format!(
                "query must start with '{}'",
                QUERY_PREFIX
            )))
        }
    };

    let mut raw_tags: Vec<String> = Vec::new();
    for segment in body.split('.') {
        match raw_tags.last_mut() {
            Some(last) if !starts_tag(segment) => {
                last.push('.');
                last.push_str(segment);
            }
            _ => raw_tags.push(segment.to_string()),
        }
    }

    let mut by_service: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for raw in raw_tags {
        let parsed = parse_tag(&raw)?;
        by_service.entry(parsed.service).or_default().push(raw);
    }

    Ok(by_service)
}

fn is_service_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_key_char(c: char) -> bool {
    is_service_char(c) || c == '-'
}

fn is_value_char(c: char) -> bool {
    !c.is_whitespace()
}

fn service_name(input: &str) -> IResult<&str, &str> {
    take_while1(is_service_char)(input)
}

fn tag_key(input: &str) -> IResult<&str, &str> {
    take_while1(is_key_char)(input)
}

fn tag_value(input: &str) -> IResult<&str, &str> {
    take_while1(is_value_char)(input)
}

fn tag_parts(input: &str) -> IResult<&str, (&str, &str, &str)> {
    tuple((
        service_name,
        preceded(char('-'), tag_key),
        preceded(char(':'), tag_value),
    ))(input)
}

#[allow(clippy::type_complexity)]
fn partial_parts(input: &str) -> IResult<&str, (&str, Option<(&str, Option<&str>)>)> {
    pair(
        take_while(is_service_char),
        opt(preceded(
            char('-'),
            pair(
                take_while(is_key_char),
                opt(preceded(char(':'), take_while(is_value_char))),
            ),
        )),
    )(input)
}

fn query_body(input: &str) -> IResult<&str, &str> {
    preceded(tag(QUERY_PREFIX), rest)(input)
}

/// Whether a dot-separated segment opens a new tag
fn starts_tag(segment: &str) -> bool {
    recognize(tuple((service_name, char('-'), tag_key, char(':'))))(segment).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tag() {
        let tag = parse_tag("servers-dc:us_west").unwrap();
        assert_eq!(tag, ParsedTag::new("servers", "dc", "us_west"));
    }

    #[test]
    fn test_parse_tag_with_dashed_key_and_dotted_value() {
        let tag = parse_tag("custom-build-id:1.2.3").unwrap();
        assert_eq!(tag.service, "custom");
        assert_eq!(tag.key, "build-id");
        assert_eq!(tag.value, "1.2.3");
    }

    #[test]
    fn test_parse_tag_errors() {
        assert!(parse_tag("").is_err());
        assert!(parse_tag("servers").is_err());
        assert!(parse_tag("servers-dc").is_err());
        assert!(parse_tag("-dc:us_west").is_err());
        assert!(parse_tag("servers-dc:us west").is_err());
    }

    #[test]
    fn test_parse_partial_service_only() {
        let partial = parse_partial_tag("serv").unwrap();
        assert_eq!(partial.service, "serv");
        assert_eq!(partial.key, None);
        assert_eq!(partial.value, None);

        let empty = parse_partial_tag("").unwrap();
        assert_eq!(empty, PartialTag::default());
    }

    #[test]
    fn test_parse_partial_key_and_value() {
        let partial = parse_partial_tag("servers-stat").unwrap();
        assert_eq!(partial.service, "servers");
        assert_eq!(partial.key.as_deref(), Some("stat"));
        assert_eq!(partial.value, None);

        let partial = parse_partial_tag("servers-status:li").unwrap();
        assert_eq!(partial.key.as_deref(), Some("status"));
        assert_eq!(partial.value.as_deref(), Some("li"));

        let partial = parse_partial_tag("servers-status:").unwrap();
        assert_eq!(partial.value.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_partial_rejects_garbage() {
        assert!(parse_partial_tag("servers status").is_err());
    }

    #[test]
    fn test_parse_query_string() {
        let query =
            parse_query_string("virt.v1.servers-dc:us_west.servers-status:live.custom-a:1")
                .unwrap();
        assert_eq!(query.len(), 2);
        assert_eq!(query["servers"], vec!["servers-dc:us_west", "servers-status:live"]);
        assert_eq!(query["custom"], vec!["custom-a:1"]);
    }

    #[test]
    fn test_parse_query_string_keeps_dotted_values() {
        let query = parse_query_string("virt.v1.re-match:host1.cpu.*.servers-dc:eu").unwrap();
        assert_eq!(query["re"], vec!["re-match:host1.cpu.*"]);
        assert_eq!(query["servers"], vec!["servers-dc:eu"]);
    }

    #[test]
    fn test_parse_query_string_errors() {
        assert!(parse_query_string("servers-dc:us_west").is_err());
        assert!(parse_query_string("virt.v1.").is_err());
        assert!(parse_query_string("virt.v1.nonsense").is_err());
    }
}
