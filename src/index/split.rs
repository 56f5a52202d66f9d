//! Split Index - Two-stage tag → join → metric index
//!
//! One split index exists per join key name (e.g. `fqdn`). Tags describe a
//! join value (a host), the join value owns metrics:
//!
//! ```text
//! servers-dc:us_west ──┐
//!                      ├─► host1 ──► host1.cpu.loadavg, host1.mem.free
//! servers-status:live ─┘
//! ```
//!
//! A query intersects the join lists of every tag and unions the metric
//! lists of the surviving joins.
//!
//! Writes go to the shared [`WriteBuffer`]; [`SplitIndex::materialize`]
//! rebuilds both maps from it, sorts every posting list and publishes the
//! result through an `ArcSwap`.

use crate::index::postings::{intersect, normalize, union};
use crate::index::{
    check_conflicts, DroppedTag, GenerationInfo, IndexError, IndexId, IndexResult, IndexStats,
    Join, MaterializeReport, Metric, QueryIndex, ServiceRouter, Tag, WriteBuffer,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Immutable, fully sorted generation of a split index
#[derive(Debug, Default)]
struct SplitSnapshot {
    tag_to_join: HashMap<Tag, Vec<Join>>,
    join_to_metric: HashMap<Join, Vec<Metric>>,
    info: GenerationInfo,
}

/// Outcome of a tag insertion
#[derive(Debug, Clone, Default)]
pub struct TagReport {
    pub accepted: usize,
    pub dropped: Vec<DroppedTag>,
}

/// Two-stage index for one join key name
pub struct SplitIndex {
    id: IndexId,
    name: String,
    buffer: Arc<WriteBuffer>,
    router: Arc<ServiceRouter>,
    snapshot: ArcSwap<SplitSnapshot>,
    build_lock: Mutex<()>,
}

impl SplitIndex {
    pub fn new(name: &str, buffer: Arc<WriteBuffer>, router: Arc<ServiceRouter>) -> Self {
        Self {
            id: IndexId::split(name),
            name: name.to_string(),
            buffer,
            router,
            snapshot: ArcSwap::from_pointee(SplitSnapshot::default()),
            build_lock: Mutex::new(()),
        }
    }

    /// Join key name this index is keyed by
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage tags describing `join_value`
    ///
    /// Malformed tags and tags whose service belongs to another index are
    /// dropped one by one. Two values for the same (service, key) slot fail
    /// the whole batch before anything is staged or bound.
    pub fn add_tags(&self, join_value: &str, raw_tags: &[String]) -> IndexResult<TagReport> {
        if raw_tags.is_empty() {
            return Err(IndexError::EmptyBatch("tags"));
        }

        let (admitted, mut dropped) = self.router.admit(raw_tags, &self.id);
        check_conflicts(&admitted)?;

        let mut accepted = Vec::with_capacity(admitted.len());
        for tag in admitted {
            // Another writer may have claimed the service since admission
            match self.router.bind(&tag.service, &self.id) {
                Ok(_) => accepted.push(tag),
                Err(error @ IndexError::ServiceConflict { .. }) => {
                    tracing::warn!(tag = %tag, index = %self.id, error = %error, "Dropped tag");
                    dropped.push(DroppedTag {
                        tag: tag.to_string(),
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        if !accepted.is_empty() {
            self.buffer.buffer_tags(&self.name, join_value, &accepted)?;
        }

        Ok(TagReport {
            accepted: accepted.len(),
            dropped,
        })
    }

    /// Stage metrics owned by `join_value`, returning how many were new
    pub fn add_metrics(&self, join_value: &str, raw_metrics: &[String]) -> IndexResult<usize> {
        self.buffer.buffer_metrics(&self.name, join_value, raw_metrics)
    }

    /// Build and publish a new generation from the staged state
    pub fn materialize(&self) -> IndexResult<MaterializeReport> {
        let _guard = self.build_lock.lock();
        let started = Instant::now();
        let staging = self.buffer.split_staging(&self.name);

        let mut tag_to_join: HashMap<Tag, Vec<Join>> = HashMap::new();
        for joins in staging.slot_values.values() {
            for (join, tag) in joins {
                tag_to_join.entry(*tag).or_default().push(*join);
            }
        }
        tag_to_join.values_mut().for_each(normalize);

        let join_to_metric: HashMap<Join, Vec<Metric>> = staging
            .join_metrics
            .into_iter()
            .map(|(join, metrics)| {
                let mut metrics: Vec<Metric> = metrics.into_iter().collect();
                metrics.sort_unstable();
                (join, metrics)
            })
            .collect();

        let info = self.snapshot.load().info.next(started);
        let keys = tag_to_join.len();
        self.snapshot.store(Arc::new(SplitSnapshot {
            tag_to_join,
            join_to_metric,
            info,
        }));

        tracing::info!(
            index = %self.id,
            generation = info.generation,
            tags = keys,
            elapsed_us = info.build_micros,
            "Materialized split index"
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

impl QueryIndex for SplitIndex {
    type Term = Tag;

    fn id(&self) -> &IndexId {
        &self.id
    }

    fn query(&self, tags: &[Tag]) -> IndexResult<Vec<Metric>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot.load();
        let mut join_lists: Vec<&[Join]> = Vec::with_capacity(tags.len());
        for tag in tags {
            match snapshot.tag_to_join.get(tag) {
                Some(joins) => join_lists.push(joins.as_slice()),
                None => return Ok(Vec::new()),
            }
        }

        let joins = intersect(&join_lists);
        let metric_lists: Vec<&[Metric]> = joins
            .iter()
            .filter_map(|join| snapshot.join_to_metric.get(join))
            .map(Vec::as_slice)
            .collect();

        Ok(union(&metric_lists))
    }

    fn generation(&self) -> u64 {
        self.snapshot.load().info.generation
    }

    fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.load();
        IndexStats {
            index: self.id.to_string(),
            kind: "split",
            generation: snapshot.info.generation,
            build_micros: snapshot.info.build_micros,
            built_at: snapshot.info.built_at,
            keys: snapshot.tag_to_join.len(),
            nodes: snapshot.join_to_metric.len(),
            postings: snapshot.tag_to_join.values().map(Vec::len).sum::<usize>()
                + snapshot.join_to_metric.values().map(Vec::len).sum::<usize>(),
        }
    }
}
