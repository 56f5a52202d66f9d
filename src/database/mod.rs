//! Database - Owner of every index and the write path into them
//!
//! # Architecture
//!
//! ```text
//! IngestMessage ──► Database ──► ServiceRouter (first writer wins)
//!                      │
//!                      ├─► SplitIndex per join key (created lazily)
//!                      ├─► FullIndex    ("custom" service)
//!                      ├─► TextIndex    ("re" service)
//!                      └─► WriteBuffer ─► TableOfContents
//!
//! materialize_indexes(): every split, full, text, then the name table
//! ```
//!
//! Query resolution and autocomplete live in `resolve`.

mod message;
mod resolve;

pub use message::{
    BatchError, BatchReport, CustomMessage, IngestMessage, IngestOutcome, MetricsMessage,
    TagsMessage,
};

use crate::config::IndexSettings;
use crate::index::{
    Catalog, FullIndex, IndexError, IndexId, IndexResult, IndexStats, MaterializeReport, Metric,
    QueryIndex, ServiceRouter, SplitIndex, TableOfContents, TextIndex, WriteBuffer,
};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::interval;

/// Shortest period the background materializer ticks at
const MIN_MATERIALIZE_INTERVAL: Duration = Duration::from_millis(10);

/// Snapshot of the database for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub indexes: Vec<IndexStats>,
    /// service → index name
    pub services: BTreeMap<String, String>,
    pub staged_metrics: usize,
    pub named_metrics: usize,
    pub catalog_values: usize,
    /// Inserts accepted since the last materialization
    pub pending_writes: u64,
}

/// Root owner of the index set
pub struct Database {
    settings: IndexSettings,
    toc: Arc<TableOfContents>,
    router: Arc<ServiceRouter>,
    buffer: Arc<WriteBuffer>,
    splits: RwLock<BTreeMap<String, Arc<SplitIndex>>>,
    full: FullIndex,
    text: TextIndex,
    /// Metric → raw name, refreshed on every materialization
    names: ArcSwap<HashMap<Metric, Arc<str>>>,
    materialize_lock: Mutex<()>,
    pending: AtomicU64,
    shutdown: AtomicBool,
    stop: Notify,
    fatal: Mutex<Option<String>>,
}

impl Database {
    /// Create an empty database with the built-in service bindings
    pub fn new(settings: IndexSettings) -> IndexResult<Self> {
        let toc = Arc::new(TableOfContents::new());
        let router = Arc::new(ServiceRouter::new(Arc::clone(&toc)));
        router.seed(&settings.custom_service, IndexId::Full)?;
        router.seed(&settings.text_service, IndexId::Text)?;

        let buffer = Arc::new(WriteBuffer::new(Arc::clone(&toc)));
        let full = FullIndex::new(Arc::clone(&buffer), Arc::clone(&router));

        Ok(Self {
            settings,
            toc,
            router,
            buffer,
            splits: RwLock::new(BTreeMap::new()),
            full,
            text: TextIndex::new(),
            names: ArcSwap::from_pointee(HashMap::new()),
            materialize_lock: Mutex::new(()),
            pending: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            stop: Notify::new(),
            fatal: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    // ==================== Write Path ====================

    /// Stage metrics owned by a join value
    pub fn insert_metrics(&self, msg: &MetricsMessage) -> IndexResult<usize> {
        validate_join(&msg.key, &msg.value)?;
        let added = self.split_index(&msg.key)?.add_metrics(&msg.value, &msg.metrics)?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(added)
    }

    /// Stage tags describing a join value
    pub fn insert_tags(&self, msg: &TagsMessage) -> IndexResult<IngestOutcome> {
        validate_join(&msg.key, &msg.value)?;
        let report = self.split_index(&msg.key)?.add_tags(&msg.value, &msg.tags)?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(IngestOutcome {
            accepted: report.accepted,
            dropped: report.dropped,
        })
    }

    /// Stage tags attached directly to metrics
    pub fn insert_custom(&self, msg: &CustomMessage) -> IndexResult<IngestOutcome> {
        let report = self.full.add_tags(&msg.tags, &msg.metrics)?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(IngestOutcome {
            accepted: report.accepted,
            dropped: report.dropped,
        })
    }

    /// Dispatch any message shape to its insertion path
    pub fn insert_message(&self, msg: &IngestMessage) -> IndexResult<IngestOutcome> {
        match msg {
            IngestMessage::Metrics(m) => self.insert_metrics(m).map(|accepted| IngestOutcome {
                accepted,
                dropped: Vec::new(),
            }),
            IngestMessage::Tags(m) => self.insert_tags(m),
            IngestMessage::Custom(m) => self.insert_custom(m),
        }
    }

    /// Decode and insert each message independently
    ///
    /// A message that fails to decode or insert is reported and skipped;
    /// the rest of the batch proceeds. Integrity errors abort the batch.
    pub fn insert_batch(&self, messages: Vec<serde_json::Value>) -> IndexResult<BatchReport> {
        let mut report = BatchReport::default();

        for (index, raw) in messages.into_iter().enumerate() {
            let outcome = serde_json::from_value::<IngestMessage>(raw)
                .map_err(|e| IndexError::InvalidMessage(e.to_string()))
                .and_then(|msg| self.insert_message(&msg));

            match outcome {
                Ok(outcome) => {
                    report.accepted += 1;
                    report.dropped_tags += outcome.dropped.len();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Rejected message in batch");
                    report.errors.push(BatchError {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.rejected = report.errors.len();
        Ok(report)
    }

    /// Split index for a join key name, created on first reference
    fn split_index(&self, name: &str) -> IndexResult<Arc<SplitIndex>> {
        if let Some(index) = self.splits.read().get(name) {
            return Ok(Arc::clone(index));
        }

        // Split index names share the catalog namespace with the built-ins
        if matches!(name, "full" | "text") {
            return Err(IndexError::InvalidMessage(format!(
                "join key name '{}' is reserved",
                name
            )));
        }

        let mut splits = self.splits.write();
        let index = splits.entry(name.to_string()).or_insert_with(|| {
            self.toc.register_index(&IndexId::split(name));
            tracing::info!(index = %name, "Created split index");
            Arc::new(SplitIndex::new(
                name,
                Arc::clone(&self.buffer),
                Arc::clone(&self.router),
            ))
        });
        Ok(Arc::clone(index))
    }

    fn split_indexes(&self) -> Vec<Arc<SplitIndex>> {
        self.splits.read().values().cloned().collect()
    }

    // ==================== Materialization ====================

    /// Publish a new generation of every index
    ///
    /// Calls are serialized; queries keep running against the previous
    /// generations until each index swaps.
    pub fn materialize_indexes(&self) -> IndexResult<Vec<MaterializeReport>> {
        let result = self.materialize_all();
        if let Err(e) = &result {
            if e.is_fatal() {
                self.record_fatal(e);
            }
        }
        result
    }

    pub(crate) fn record_fatal(&self, error: &IndexError) {
        *self.fatal.lock() = Some(error.to_string());
    }

    fn materialize_all(&self) -> IndexResult<Vec<MaterializeReport>> {
        let _guard = self.materialize_lock.lock();
        let started = Instant::now();
        let pending = self.pending.swap(0, Ordering::Relaxed);

        let mut reports = Vec::new();
        for split in self.split_indexes() {
            reports.push(split.materialize()?);
        }
        reports.push(self.full.materialize()?);
        reports.push(self.text.materialize(&self.buffer.metric_list())?);

        // The buffer only grows, so this covers every metric just published
        self.names.store(Arc::new(self.buffer.metric_names()));

        tracing::info!(
            indexes = reports.len(),
            pending,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Materialized indexes"
        );
        Ok(reports)
    }

    /// Spawn a task materializing on every tick while writes are pending
    ///
    /// Runs one final materialization once [`Database::shutdown`] is called.
    /// An integrity failure stops the task; it stays visible through
    /// [`Database::fatal_error`].
    pub fn start_background_materialize(
        self: &Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let db = Arc::clone(self);
        let every = if every < MIN_MATERIALIZE_INTERVAL {
            tracing::warn!(
                requested_ms = every.as_millis() as u64,
                "Materialize interval too short, using {:?}",
                MIN_MATERIALIZE_INTERVAL
            );
            MIN_MATERIALIZE_INTERVAL
        } else {
            every
        };

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = db.stop.notified() => break,
                }

                if db.shutdown.load(Ordering::Acquire) {
                    break;
                }

                if db.pending.load(Ordering::Relaxed) > 0 {
                    db.materialize_blocking("Background materialization").await;
                }

                if let Some(error) = db.fatal_error() {
                    tracing::error!(error = %error, "Background materialization stopped");
                    return;
                }
            }

            db.materialize_blocking("Final materialization").await;
        })
    }

    async fn materialize_blocking(self: &Arc<Self>, what: &'static str) {
        let db = Arc::clone(self);
        match tokio::task::spawn_blocking(move || db.materialize_indexes()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(fatal = e.is_fatal(), "{} failed: {}", what, e),
            Err(e) => tracing::error!("{} task failed: {}", what, e),
        }
    }

    /// Integrity failure that stopped materialization, if any
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    /// Stop the background materializer
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stop.notify_one();
    }

    // ==================== Introspection ====================

    /// Table of Contents snapshot
    pub fn catalog(&self) -> Catalog {
        self.toc.get_table()
    }

    /// Generation of the text index
    ///
    /// It is materialized last, so every other index is at least as recent.
    pub fn generation(&self) -> u64 {
        self.text.generation()
    }

    /// Registered services, sorted
    pub fn services(&self) -> Vec<String> {
        self.router.services()
    }

    pub fn stats(&self) -> DatabaseStats {
        let mut indexes: Vec<IndexStats> =
            self.split_indexes().iter().map(|split| split.stats()).collect();
        indexes.push(self.full.stats());
        indexes.push(self.text.stats());

        DatabaseStats {
            indexes,
            services: self
                .router
                .routes()
                .into_iter()
                .map(|(service, index)| (service, index.to_string()))
                .collect(),
            staged_metrics: self.buffer.metric_count(),
            named_metrics: self.names.load().len(),
            catalog_values: self.toc.value_count(),
            pending_writes: self.pending.load(Ordering::Relaxed),
        }
    }
}

fn validate_join(key: &str, value: &str) -> IndexResult<()> {
    if key.trim().is_empty() {
        return Err(IndexError::InvalidMessage("join key name is empty".to_string()));
    }
    if value.trim().is_empty() {
        return Err(IndexError::InvalidMessage(format!(
            "join value for '{}' is empty",
            key
        )));
    }
    Ok(())
}
