//! Table of Contents - Catalog of every known tag for autocomplete
//!
//! Nested mapping `index → service → key → value → metric count`.
//!
//! # Counters
//!
//! ```text
//! fqdn / servers / dc / us_west ─┬─ counter(join host1) = 12
//!                                └─ counter(join host2) = 30   → 42
//! ```
//!
//! A value's count is the sum of every counter that reaches it. Counters are
//! keyed by contributor (a join for split indexes, a tag for the full index),
//! created once and only overwritten afterwards. Nothing is ever removed.
//!
//! The catalog is updated when data is buffered, ahead of materialization,
//! so it may advertise values that are not queryable yet.

use crate::index::{IndexError, IndexId, IndexResult};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read snapshot of the catalog: index → service → key → value → count
pub type Catalog = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>>;

type Counter = Arc<AtomicU64>;

/// Values of one key, each with the counters reaching it
type KeyEntry = BTreeMap<String, HashMap<u64, Counter>>;

#[derive(Debug, Default)]
struct IndexEntry {
    /// service → key → value → contributors
    services: BTreeMap<String, BTreeMap<String, KeyEntry>>,
    /// contributor id → counter
    counters: HashMap<u64, Counter>,
}

impl IndexEntry {
    fn counter(&mut self, contributor: u64) -> Counter {
        Arc::clone(self.counters.entry(contributor).or_default())
    }
}

/// Concurrent catalog of (index, service, key, value) tuples
#[derive(Debug, Default)]
pub struct TableOfContents {
    indexes: RwLock<BTreeMap<IndexId, IndexEntry>>,
}

impl TableOfContents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an index known to the catalog (idempotent)
    pub fn register_index(&self, index: &IndexId) {
        let mut indexes = self.indexes.write();
        indexes.entry(index.clone()).or_default();
    }

    /// Record that an index now holds entries for a service
    pub fn add_index_service_entry(&self, index: &IndexId, service: &str) -> IndexResult<()> {
        let mut indexes = self.indexes.write();
        let entry = indexes
            .get_mut(index)
            .ok_or_else(|| IndexError::integrity(format!("catalog has no index '{}'", index)))?;

        if entry.services.contains_key(service) {
            return Err(IndexError::DuplicateService {
                index: index.clone(),
                service: service.to_string(),
            });
        }

        entry.services.insert(service.to_string(), BTreeMap::new());
        Ok(())
    }

    /// Record that `service-key:value` is reachable through `contributor`
    pub fn add_tag(
        &self,
        index: &IndexId,
        service: &str,
        key: &str,
        value: &str,
        contributor: u64,
    ) -> IndexResult<()> {
        let mut indexes = self.indexes.write();
        let entry = indexes
            .get_mut(index)
            .ok_or_else(|| IndexError::integrity(format!("catalog has no index '{}'", index)))?;

        let counter = entry.counter(contributor);
        let keys = entry.services.get_mut(service).ok_or_else(|| {
            IndexError::integrity(format!(
                "catalog has no service '{}' under index '{}'",
                service, index
            ))
        })?;

        keys.entry(key.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default()
            .entry(contributor)
            .or_insert(counter);

        Ok(())
    }

    /// Overwrite the metric count of a contributor's counter
    pub fn set_metric_count(&self, index: &IndexId, contributor: u64, count: u64) -> IndexResult<()> {
        let indexes = self.indexes.upgradable_read();
        let entry = indexes
            .get(index)
            .ok_or_else(|| IndexError::integrity(format!("catalog has no index '{}'", index)))?;

        if let Some(counter) = entry.counters.get(&contributor) {
            counter.store(count, Ordering::Relaxed);
            return Ok(());
        }

        let mut indexes = RwLockUpgradableReadGuard::upgrade(indexes);
        if let Some(entry) = indexes.get_mut(index) {
            entry.counter(contributor).store(count, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Snapshot of the whole catalog with counters summed per value
    pub fn get_table(&self) -> Catalog {
        let indexes = self.indexes.read();
        indexes
            .iter()
            .map(|(index, entry)| {
                let services: BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>> = entry
                    .services
                    .iter()
                    .map(|(service, keys)| {
                        let keys: BTreeMap<String, BTreeMap<String, u64>> = keys
                            .iter()
                            .map(|(key, values)| {
                                let values: BTreeMap<String, u64> = values
                                    .iter()
                                    .map(|(value, counters)| (value.clone(), sum(counters)))
                                    .collect();
                                (key.clone(), values)
                            })
                            .collect();
                        (service.clone(), keys)
                    })
                    .collect();
                (index.to_string(), services)
            })
            .collect()
    }

    /// Services registered under an index
    pub fn services(&self, index: &IndexId) -> Vec<String> {
        self.indexes
            .read()
            .get(index)
            .map(|entry| entry.services.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of `service` starting with `partial_key`, framed as `service-key:`
    ///
    /// When `partial_key` names an existing key exactly, that key's values are
    /// appended as `service-key:value` completions.
    pub fn complete_key(
        &self,
        index: &IndexId,
        service: &str,
        partial_key: &str,
    ) -> IndexResult<Vec<String>> {
        let indexes = self.indexes.read();
        let keys = service_keys(&indexes, index, service)?;

        let mut completions: Vec<String> = keys
            .keys()
            .filter(|key| key.starts_with(partial_key))
            .map(|key| format!("{}-{}:", service, key))
            .collect();

        if let Some(values) = keys.get(partial_key) {
            completions.extend(
                values
                    .keys()
                    .map(|value| format!("{}-{}:{}", service, partial_key, value)),
            );
        }

        Ok(completions)
    }

    /// Values of `service-key` starting with `partial_value`
    pub fn complete_value(
        &self,
        index: &IndexId,
        service: &str,
        key: &str,
        partial_value: &str,
    ) -> IndexResult<Vec<String>> {
        let indexes = self.indexes.read();
        let keys = service_keys(&indexes, index, service)?;

        Ok(keys
            .get(key)
            .map(|values| {
                values
                    .keys()
                    .filter(|value| value.starts_with(partial_value))
                    .map(|value| format!("{}-{}:{}", service, key, value))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Number of distinct (service, key, value) tuples across all indexes
    pub fn value_count(&self) -> usize {
        self.indexes
            .read()
            .values()
            .flat_map(|entry| entry.services.values())
            .flat_map(|keys| keys.values())
            .map(|values| values.len())
            .sum()
    }
}

fn service_keys<'a>(
    indexes: &'a BTreeMap<IndexId, IndexEntry>,
    index: &IndexId,
    service: &str,
) -> IndexResult<&'a BTreeMap<String, KeyEntry>> {
    indexes
        .get(index)
        .ok_or_else(|| IndexError::integrity(format!("catalog has no index '{}'", index)))?
        .services
        .get(service)
        .ok_or_else(|| {
            IndexError::integrity(format!(
                "catalog has no service '{}' under index '{}'",
                service, index
            ))
        })
}

fn sum(counters: &HashMap<u64, Counter>) -> u64 {
    counters
        .values()
        .map(|counter| counter.load(Ordering::Relaxed))
        .sum()
}
