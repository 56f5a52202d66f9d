//! Query resolution and autocomplete
//!
//! A query names tags per service. Each service resolves to the index it is
//! bound to; tags are grouped per index and every non-text index is queried
//! once. A metric survives when every queried index returned it. Text
//! service tags carry regex patterns and only narrow the survivors.

use super::Database;
use crate::index::{IndexId, Metric, QueryIndex, Tag};
use crate::query::{parse_partial_tag, parse_query_string, parse_tag, QueryError, QueryResult};
use std::collections::{BTreeMap, HashMap, HashSet};

impl Database {
    /// Metric names matching every tag, sorted by name
    ///
    /// Services without a bound index are skipped with a warning.
    pub fn query(&self, tags_by_service: &BTreeMap<String, Vec<String>>) -> QueryResult<Vec<String>> {
        let mut by_index: BTreeMap<IndexId, Vec<Tag>> = BTreeMap::new();
        let mut patterns: Vec<String> = Vec::new();

        for (service, raw_tags) in tags_by_service {
            let index = match self.router.lookup(service) {
                Some(index) => index,
                None => {
                    tracing::warn!(service = %service, "Ignoring tags of unknown service");
                    continue;
                }
            };

            for raw in raw_tags {
                let tag = parse_tag(raw)?;
                if tag.service != *service {
                    return Err(QueryError::Parse(format!(
                        "tag '{}' listed under service '{}'",
                        raw, service
                    )));
                }

                if index.is_text() {
                    patterns.push(tag.value);
                } else {
                    by_index.entry(index.clone()).or_default().push(tag.id());
                }
            }
        }

        // Text is a filter stage and does not count toward the threshold
        let threshold = by_index.len();
        let mut survivors: Vec<Metric> = Vec::new();

        if threshold > 0 {
            let mut counts: HashMap<Metric, usize> = HashMap::new();
            for (index, tags) in &by_index {
                let metrics = self.query_index(index, tags)?;
                if metrics.is_empty() {
                    return Ok(Vec::new());
                }
                for metric in metrics {
                    *counts.entry(metric).or_default() += 1;
                }
            }
            survivors = counts
                .into_iter()
                .filter(|(_, count)| *count == threshold)
                .map(|(metric, _)| metric)
                .collect();
        }

        if !patterns.is_empty() {
            let matched = self.text.search(&patterns)?;
            if threshold == 0 {
                survivors = matched;
            } else {
                let matched: HashSet<Metric> = matched.into_iter().collect();
                survivors.retain(|metric| matched.contains(metric));
            }
        }

        Ok(self.resolve_names(&survivors))
    }

    /// Parse a `virt.v1.` query string and run it
    pub fn query_str(&self, raw: &str) -> QueryResult<Vec<String>> {
        let tags_by_service = parse_query_string(raw)?;
        self.query(&tags_by_service)
    }

    fn query_index(&self, index: &IndexId, tags: &[Tag]) -> QueryResult<Vec<Metric>> {
        let metrics = match index {
            IndexId::Split(name) => {
                let split = self.splits.read().get(name).cloned();
                match split {
                    Some(split) => split.query(tags)?,
                    None => Vec::new(),
                }
            }
            IndexId::Full => self.full.query(tags)?,
            IndexId::Text => Vec::new(),
        };
        Ok(metrics)
    }

    fn resolve_names(&self, metrics: &[Metric]) -> Vec<String> {
        let names = self.names.load();
        let mut resolved: Vec<String> = metrics
            .iter()
            .filter_map(|metric| match names.get(metric) {
                Some(name) => Some(name.to_string()),
                None => {
                    tracing::debug!(metric = %metric, "Metric has no name yet");
                    None
                }
            })
            .collect();
        resolved.sort();
        resolved
    }

    /// Completions for a partially typed tag
    ///
    /// A trailing `*` is ignored. Until a registered service followed by `-`
    /// has been typed, matching services are offered as `service-`.
    pub fn autocomplete(&self, partial: &str) -> QueryResult<Vec<String>> {
        let trimmed = partial.trim().trim_end_matches('*');
        let parsed = parse_partial_tag(trimmed)?;

        let (key, index) = match (parsed.key.as_deref(), self.router.lookup(&parsed.service)) {
            (Some(key), Some(index)) => (key, index),
            _ => {
                return Ok(self
                    .router
                    .services()
                    .into_iter()
                    .filter(|service| service.starts_with(&parsed.service))
                    .map(|service| format!("{}-", service))
                    .collect());
            }
        };

        if index.is_text() {
            return Ok(if key.is_empty() && parsed.value.is_none() {
                vec![format!("{}-match:", parsed.service)]
            } else {
                Vec::new()
            });
        }

        let completions = match parsed.value.as_deref() {
            None => self.toc.complete_key(&index, &parsed.service, key)?,
            Some(value) => self.toc.complete_value(&index, &parsed.service, key, value)?,
        };
        Ok(completions)
    }
}
