//! Write Buffer - Staging area for every insertion
//!
//! All inserts land here first. Materialization reads the staged state and
//! rebuilds immutable snapshots from it; the buffer itself is long-lived and
//! keeps accumulating, so each generation reflects everything seen so far.
//!
//! # Layout
//!
//! ```text
//! metric_names : Metric → raw name          (feeds the text index)
//! split[fqdn]  : join_metrics  Join → {Metric}
//!                slot_values   (service, key) → Join → Tag
//! full         : tag_metrics   Tag → {Metric}
//! ```
//!
//! A join holds one value per (service, key) slot. A later batch may replace
//! that value; two different values for the same slot inside one batch are
//! rejected as ambiguous.

use crate::index::{
    IndexError, IndexId, IndexResult, Join, Metric, ParsedTag, TableOfContents, Tag,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A `(service, key)` pair
pub type Slot = (String, String);

/// Staged state of one split index
#[derive(Debug, Clone, Default)]
pub struct SplitStaging {
    /// join → metrics owned by that join
    pub join_metrics: HashMap<Join, HashSet<Metric>>,
    /// (service, key) → join → tag currently holding that slot
    pub slot_values: HashMap<Slot, HashMap<Join, Tag>>,
}

/// Staged state of the full index
#[derive(Debug, Clone, Default)]
pub struct FullStaging {
    pub tag_metrics: HashMap<Tag, HashSet<Metric>>,
}

#[derive(Debug, Default)]
struct BufferState {
    metric_names: HashMap<Metric, Arc<str>>,
    split: HashMap<String, SplitStaging>,
    full: FullStaging,
}

/// Staging structure shared by every index
#[derive(Debug)]
pub struct WriteBuffer {
    state: Mutex<BufferState>,
    toc: Arc<TableOfContents>,
}

impl WriteBuffer {
    pub fn new(toc: Arc<TableOfContents>) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            toc,
        }
    }

    /// Stage metrics owned by a join of split index `index_name`
    ///
    /// Returns the number of metrics newly associated with the join.
    pub fn buffer_metrics(
        &self,
        index_name: &str,
        join_raw: &str,
        raw_metrics: &[String],
    ) -> IndexResult<usize> {
        let names = non_empty_names(raw_metrics)?;
        let join = Join::hash(join_raw);
        let index = IndexId::split(index_name);

        let mut state = self.state.lock();
        let state = &mut *state;
        for name in &names {
            state
                .metric_names
                .entry(Metric::hash(name))
                .or_insert_with(|| Arc::from(*name));
        }

        let staged = state
            .split
            .entry(index_name.to_string())
            .or_default()
            .join_metrics
            .entry(join)
            .or_default();

        let before = staged.len();
        staged.extend(names.iter().map(|name| Metric::hash(name)));
        let count = staged.len();

        self.toc.set_metric_count(&index, join.value(), count as u64)?;
        Ok(count - before)
    }

    /// Stage tag values for a join of split index `index_name`
    ///
    /// Fails without touching any staged state when the batch is empty or
    /// holds two different values for one (service, key) slot.
    pub fn buffer_tags(&self, index_name: &str, join_raw: &str, tags: &[ParsedTag]) -> IndexResult<()> {
        if tags.is_empty() {
            return Err(IndexError::EmptyBatch("tags"));
        }
        check_conflicts(tags)?;

        let join = Join::hash(join_raw);
        let index = IndexId::split(index_name);

        let mut state = self.state.lock();
        let staging = state.split.entry(index_name.to_string()).or_default();
        for tag in tags {
            staging
                .slot_values
                .entry((tag.service.clone(), tag.key.clone()))
                .or_default()
                .insert(join, tag.id());

            self.toc
                .add_tag(&index, &tag.service, &tag.key, &tag.value, join.value())?;
        }

        Ok(())
    }

    /// Associate every tag with every metric in the batch (full index)
    pub fn buffer_custom(&self, tags: &[ParsedTag], raw_metrics: &[String]) -> IndexResult<()> {
        if tags.is_empty() {
            return Err(IndexError::EmptyBatch("tags"));
        }
        let names = non_empty_names(raw_metrics)?;
        let metrics: Vec<Metric> = names.iter().map(|name| Metric::hash(name)).collect();

        let mut state = self.state.lock();
        let state = &mut *state;
        for (name, metric) in names.iter().zip(&metrics) {
            state
                .metric_names
                .entry(*metric)
                .or_insert_with(|| Arc::from(*name));
        }

        for tag in tags {
            let id = tag.id();
            let staged = state.full.tag_metrics.entry(id).or_default();
            staged.extend(metrics.iter().copied());
            let count = staged.len() as u64;

            self.toc
                .add_tag(&IndexId::Full, &tag.service, &tag.key, &tag.value, id.value())?;
            self.toc.set_metric_count(&IndexId::Full, id.value(), count)?;
        }

        Ok(())
    }

    /// Every staged raw metric name
    pub fn metric_list(&self) -> Vec<String> {
        self.state
            .lock()
            .metric_names
            .values()
            .map(|name| name.to_string())
            .collect()
    }

    /// Metric identifier → raw name table
    pub fn metric_names(&self) -> HashMap<Metric, Arc<str>> {
        self.state.lock().metric_names.clone()
    }

    /// Copy of the staged state of one split index
    pub fn split_staging(&self, index_name: &str) -> SplitStaging {
        self.state
            .lock()
            .split
            .get(index_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the staged state of the full index
    pub fn full_staging(&self) -> FullStaging {
        self.state.lock().full.clone()
    }

    /// Number of distinct metric names staged
    pub fn metric_count(&self) -> usize {
        self.state.lock().metric_names.len()
    }
}

/// Reject batches holding two different values for one (service, key) slot
pub fn check_conflicts(tags: &[ParsedTag]) -> IndexResult<()> {
    let mut seen: HashMap<(&str, &str), &str> = HashMap::with_capacity(tags.len());
    for tag in tags {
        match seen.get(&tag.slot()) {
            Some(&first) if first != tag.value => {
                return Err(IndexError::ConflictingTags {
                    service: tag.service.clone(),
                    key: tag.key.clone(),
                    first: first.to_string(),
                    second: tag.value.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(tag.slot(), &tag.value);
            }
        }
    }
    Ok(())
}

/// Drop empty metric names, failing when nothing is left
/// Whether at least one metric name survives trimming
pub(crate) fn has_metric_names(raw_metrics: &[String]) -> bool {
    raw_metrics.iter().any(|name| !name.trim().is_empty())
}

fn non_empty_names(raw_metrics: &[String]) -> IndexResult<Vec<&str>> {
    let names: Vec<&str> = raw_metrics
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();

    if names.len() < raw_metrics.len() {
        tracing::warn!(
            dropped = raw_metrics.len() - names.len(),
            "Dropped empty metric names from batch"
        );
    }

    if names.is_empty() {
        return Err(IndexError::EmptyBatch("metrics"));
    }
    Ok(names)
}
