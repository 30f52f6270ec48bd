//! Request orchestration: coverage check, ingest, store update, record.
//!
//! [`RequestOrchestrator::ensure`] is the single entry point consumers use
//! to make a product's data for a range available in the store. Ranges
//! already covered (within the configured tolerance) return without any
//! I/O. Otherwise the pipeline runs, the store is updated and the tracker
//! records what was fetched according to the [`RecordPolicy`].
//!
//! Calls for the same key are serialised so the coverage check, the update
//! and the record step never interleave between two requests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    config::{CacheConfig, FetchStrategy, RecordPolicy, Settings},
    coverage::{CoverageSet, CoverageTracker},
    ingest::{
        Degradation, ErrorKind, Ingest, IngestOutcome, IngestionPipeline, PipelineError,
        TimeParseSnafu,
    },
    product::ProductKey,
    store::ProductStore,
    time::TimeRange,
};

/// Result of [`RequestOrchestrator::ensure`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnsureOutcome {
    /// The range was already covered; nothing was read.
    Covered,
    /// The pipeline ran.
    Ingested {
        /// Rows merged into the store.
        rows: usize,
        /// Notices from every pipeline run.
        notices: Vec<Degradation>,
    },
}

impl EnsureOutcome {
    /// True if nothing had to be read.
    pub fn was_covered(&self) -> bool {
        matches!(self, EnsureOutcome::Covered)
    }
}

/// Glue between the coverage tracker, the pipeline and the store.
pub struct RequestOrchestrator {
    tracker: Arc<CoverageTracker>,
    store: Arc<ProductStore>,
    ingestor: Arc<dyn Ingest>,
    config: CacheConfig,
    locks: Mutex<HashMap<ProductKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RequestOrchestrator {
    /// Create an orchestrator over the given components.
    pub fn new(
        tracker: Arc<CoverageTracker>,
        store: Arc<ProductStore>,
        ingestor: Arc<dyn Ingest>,
        config: CacheConfig,
    ) -> Self {
        Self {
            tracker,
            store,
            ingestor,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create an orchestrator with a fresh tracker and store and an
    /// [`IngestionPipeline`] built from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(CoverageTracker::new()),
            Arc::new(ProductStore::new()),
            Arc::new(IngestionPipeline::from_settings(settings)),
            settings.cache.clone(),
        )
    }

    /// The coverage tracker.
    pub fn tracker(&self) -> &Arc<CoverageTracker> {
        &self.tracker
    }

    /// The product store.
    pub fn store(&self) -> &Arc<ProductStore> {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn key_lock(&self, key: &ProductKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Like [`ensure`](Self::ensure), with the bounds given as calendar
    /// strings.
    pub async fn ensure_between(
        &self,
        key: &ProductKey,
        start: &str,
        end: &str,
    ) -> Result<EnsureOutcome, PipelineError> {
        let range = TimeRange::parse(start, end).context(TimeParseSnafu)?;
        self.ensure(key, range).await
    }

    /// Make `key`'s data for `range` available in the store.
    ///
    /// A `NoDataFound` failure is still recorded under
    /// [`RecordPolicy::Always`] and then returned. Other failures record
    /// nothing. Slots whose file exists but failed to read are never
    /// recorded, whatever the policy.
    pub async fn ensure(&self, key: &ProductKey, range: TimeRange) -> Result<EnsureOutcome, PipelineError> {
        if range.is_empty() {
            return Ok(EnsureOutcome::Covered);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let tolerance = self.config.tolerance_ticks();
        if self.tracker.is_covered(key, range, tolerance) {
            debug!("{key} already covers {range}");
            return Ok(EnsureOutcome::Covered);
        }

        let targets = match self.config.fetch_strategy {
            FetchStrategy::FullRange => vec![range],
            FetchStrategy::Remainder => {
                // Exact gaps; tolerance only gates the fetch.
                let gaps = self.tracker.uncovered(key, range, 0);
                if gaps.is_empty() { vec![range] } else { gaps }
            }
        };

        let mut rows = 0;
        let mut notices = Vec::new();
        let mut last_miss = None;
        let mut any_success = false;

        for target in targets {
            match self.ingestor.ingest(key, target).await {
                Ok(outcome) => {
                    any_success = true;
                    rows += outcome.bundle.len();
                    self.apply(key, target, outcome, &mut notices);
                }
                Err(e) if e.kind() == ErrorKind::NoDataFound => {
                    if self.config.record_policy == RecordPolicy::Always {
                        warn!("No data for {key} in {target}; recording it as covered anyway");
                        self.record_readable(key, target, e.notices());
                    }
                    notices.extend_from_slice(e.notices());
                    last_miss = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_miss {
            Some(e) if !any_success => Err(e),
            _ => {
                info!("Ensured {key} for {range}: {rows} row(s), {} notice(s)", notices.len());
                Ok(EnsureOutcome::Ingested { rows, notices })
            }
        }
    }

    fn apply(
        &self,
        key: &ProductKey,
        target: TimeRange,
        outcome: IngestOutcome,
        notices: &mut Vec<Degradation>,
    ) {
        let partial = outcome.is_partial();
        let IngestOutcome {
            bundle,
            notices: run_notices,
            located_slots,
        } = outcome;

        if !bundle.is_empty() {
            self.store.update(key, bundle);
        }

        match self.config.record_policy {
            RecordPolicy::Always => {
                if partial {
                    warn!(
                        "Recording {target} for {key} although some of it had no data; \
                         late files will not be picked up"
                    );
                }
                self.record_readable(key, target, &run_notices);
            }
            RecordPolicy::LocatedOnly => {
                for slot in located_slots {
                    if let Some(part) = slot.intersect(&target) {
                        self.tracker.record(key, part);
                    }
                }
            }
        }

        notices.extend(run_notices);
    }

    /// Record `target` minus the slots whose file failed to read.
    fn record_readable(&self, key: &ProductKey, target: TimeRange, notices: &[Degradation]) {
        let mut failed = CoverageSet::new();
        for slot in notices.iter().filter_map(Degradation::failed_slot) {
            if let Some(part) = slot.intersect(&target) {
                failed.insert(part);
            }
        }
        if !failed.is_empty() {
            warn!(
                "Leaving {} unreadable span(s) of {target} unrecorded for {key}",
                failed.len()
            );
        }
        for part in failed.gaps(target, 0) {
            self.tracker.record(key, part);
        }
    }
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
