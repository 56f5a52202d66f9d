//! Full Index - Direct tag → metric index
//!
//! Holds associations that do not go through a join value. Every tag of an
//! insertion is linked to every metric of it, and a query intersects the
//! metric lists of the requested tags.

use crate::index::buffer::has_metric_names;
use crate::index::postings::intersect;
use crate::index::{
    DroppedTag, GenerationInfo, IndexError, IndexId, IndexResult, IndexStats, MaterializeReport,
    Metric, ParsedTag, QueryIndex, ServiceRouter, Tag, TagReport, WriteBuffer,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
struct FullSnapshot {
    tag_to_metric: HashMap<Tag, Vec<Metric>>,
    info: GenerationInfo,
}

/// Single-stage index for custom tagging
pub struct FullIndex {
    id: IndexId,
    buffer: Arc<WriteBuffer>,
    router: Arc<ServiceRouter>,
    snapshot: ArcSwap<FullSnapshot>,
    build_lock: Mutex<()>,
}

impl FullIndex {
    pub fn new(buffer: Arc<WriteBuffer>, router: Arc<ServiceRouter>) -> Self {
        Self {
            id: IndexId::Full,
            buffer,
            router,
            snapshot: ArcSwap::from_pointee(FullSnapshot::default()),
            build_lock: Mutex::new(()),
        }
    }

    /// Route raw tags and stage them against `raw_metrics`
    ///
    /// Tags that fail to parse or belong to another index are dropped
    /// individually. A message without metrics is rejected before any
    /// service is bound.
    pub fn add_tags(&self, raw_tags: &[String], raw_metrics: &[String]) -> IndexResult<TagReport> {
        if raw_tags.is_empty() {
            return Err(IndexError::EmptyBatch("tags"));
        }
        if !has_metric_names(raw_metrics) {
            return Err(IndexError::EmptyBatch("metrics"));
        }

        let (admitted, mut dropped) = self.router.admit(raw_tags, &self.id);
        let mut accepted = Vec::with_capacity(admitted.len());
        for tag in admitted {
            match self.router.bind(&tag.service, &self.id) {
                Ok(_) => accepted.push(tag),
                Err(error @ IndexError::ServiceConflict { .. }) => {
                    tracing::warn!(tag = %tag, error = %error, "Dropped custom tag");
                    dropped.push(DroppedTag {
                        tag: tag.to_string(),
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        if !accepted.is_empty() {
            self.add(&accepted, raw_metrics)?;
        }

        Ok(TagReport {
            accepted: accepted.len(),
            dropped,
        })
    }

    /// Stage already validated tags against `raw_metrics`
    pub fn add(&self, tags: &[ParsedTag], raw_metrics: &[String]) -> IndexResult<()> {
        self.buffer.buffer_custom(tags, raw_metrics)
    }

    /// Build and publish a new generation from the staged state
    pub fn materialize(&self) -> IndexResult<MaterializeReport> {
        let _guard = self.build_lock.lock();
        let started = Instant::now();

        let tag_to_metric: HashMap<Tag, Vec<Metric>> = self
            .buffer
            .full_staging()
            .tag_metrics
            .into_iter()
            .map(|(tag, metrics)| {
                let mut metrics: Vec<Metric> = metrics.into_iter().collect();
                metrics.sort_unstable();
                (tag, metrics)
            })
            .collect();

        let info = self.snapshot.load().info.next(started);
        let keys = tag_to_metric.len();
        self.snapshot.store(Arc::new(FullSnapshot {
            tag_to_metric,
            info,
        }));

        tracing::info!(
            index = %self.id,
            generation = info.generation,
            tags = keys,
            elapsed_us = info.build_micros,
            "Materialized full index"
        );

        Ok(MaterializeReport {
            index: self.id.to_string(),
            generation: info.generation,
            keys,
            added: 0,
            build_micros: info.build_micros,
        })
    }
}

impl QueryIndex for FullIndex {
    type Term = Tag;

    fn id(&self) -> &IndexId {
        &self.id
    }

    fn query(&self, tags: &[Tag]) -> IndexResult<Vec<Metric>> {
        let snapshot = self.snapshot.load();
        let mut lists: Vec<&[Metric]> = Vec::with_capacity(tags.len());
        for tag in tags {
            match snapshot.tag_to_metric.get(tag) {
                Some(metrics) => lists.push(metrics.as_slice()),
                None => return Ok(Vec::new()),
            }
        }
        Ok(intersect(&lists))
    }

    fn generation(&self) -> u64 {
        self.snapshot.load().info.generation
    }

    fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.load();
        IndexStats {
            index: self.id.to_string(),
            kind: "full",
            generation: snapshot.info.generation,
            build_micros: snapshot.info.build_micros,
            built_at: snapshot.info.built_at,
            keys: snapshot.tag_to_metric.len(),
            nodes: 0,
            postings: snapshot.tag_to_metric.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TableOfContents;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_index() -> FullIndex {
        let toc = Arc::new(TableOfContents::new());
        toc.register_index(&IndexId::split("fqdn"));
        let router = Arc::new(ServiceRouter::new(Arc::clone(&toc)));
        router.seed("custom", IndexId::Full).unwrap();
        router.bind("servers", &IndexId::split("fqdn")).unwrap();
        FullIndex::new(Arc::new(WriteBuffer::new(toc)), router)
    }

    #[test]
    fn test_cross_product() {
        let index = create_test_index();
        index
            .add_tags(&strings(&["custom-a:1", "custom-b:2"]), &strings(&["m1", "m2"]))
            .unwrap();
        index.materialize().unwrap();

        let mut expected = vec![Metric::hash("m1"), Metric::hash("m2")];
        expected.sort();

        let a = Tag::hash("custom-a:1");
        let b = Tag::hash("custom-b:2");
        assert_eq!(index.query(&[a]).unwrap(), expected);
        assert_eq!(index.query(&[b]).unwrap(), expected);
        assert_eq!(index.query(&[a, b]).unwrap(), expected);
    }

    #[test]
    fn test_intersection_narrows() {
        let index = create_test_index();
        index
            .add_tags(&strings(&["custom-team:db"]), &strings(&["m1", "m2", "m3"]))
            .unwrap();
        index
            .add_tags(&strings(&["custom-tier:gold"]), &strings(&["m2", "m4"]))
            .unwrap();
        index.materialize().unwrap();

        let result = index
            .query(&[Tag::hash("custom-team:db"), Tag::hash("custom-tier:gold")])
            .unwrap();
        assert_eq!(result, vec![Metric::hash("m2")]);
        assert!(index.query(&[Tag::hash("custom-team:web")]).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_and_malformed_tags_dropped() {
        let index = create_test_index();
        let report = index
            .add_tags(
                &strings(&["custom-a:1", "servers-dc:eu", "bogus"]),
                &strings(&["m1"]),
            )
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.dropped.len(), 2);
    }

    #[test]
    fn test_empty_lists_rejected() {
        let index = create_test_index();
        assert!(index.add_tags(&[], &strings(&["m1"])).is_err());
        assert!(index.add_tags(&strings(&["custom-a:1"]), &[]).is_err());
    }

    #[test]
    fn test_rejected_message_binds_nothing() {
        let index = create_test_index();

        let err = index
            .add_tags(&strings(&["teams-owner:db"]), &[])
            .unwrap_err();
        assert_eq!(err, IndexError::EmptyBatch("metrics"));
        assert!(index.router.lookup("teams").is_none());

        let err = index
            .add_tags(&strings(&["teams-owner:db"]), &strings(&["  ", ""]))
            .unwrap_err();
        assert_eq!(err, IndexError::EmptyBatch("metrics"));
        assert!(index.router.lookup("teams").is_none());

        // The service is still free for a join-keyed index
        let binding = index
            .router
            .bind("teams", &IndexId::split("fqdn"))
            .unwrap();
        assert_eq!(binding, crate::index::Binding::Created);
    }

    #[test]
    fn test_generation_increases() {
        let index = create_test_index();
        assert_eq!(index.generation(), 0);
        index.materialize().unwrap();
        index.materialize().unwrap();
        assert_eq!(index.stats().generation, 2);
    }
}
