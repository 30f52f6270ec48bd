//! Per-product coverage bookkeeping shared across requests.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::debug;

use crate::{
    coverage::CoverageSet,
    product::ProductKey,
    time::TimeRange,
};

/// Records, for every product key, which time ranges have already been
/// ingested into the store.
///
/// Interior mutability lets the orchestrator share one tracker between
/// concurrent requests; individual operations are atomic with respect to
/// each other. A product never seen before is treated as having empty
/// coverage.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    sets: RwLock<HashMap<ProductKey, CoverageSet>>,
}

impl CoverageTracker {
    /// Create a tracker with no coverage for any product.
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoned locks are recovered: sets are never left half-merged.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProductKey, CoverageSet>> {
        self.sets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProductKey, CoverageSet>> {
        self.sets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// True iff `range` lies inside one connected, tolerance-expanded piece
    /// of the coverage recorded for `key`.
    pub fn is_covered(&self, key: &ProductKey, range: TimeRange, tolerance: i64) -> bool {
        self.read()
            .get(key)
            .is_some_and(|set| set.covers(range, tolerance))
    }

    /// Add `range` to the coverage of `key`, merging with every overlapping
    /// or touching interval. Returns `true` if the coverage changed.
    pub fn record(&self, key: &ProductKey, range: TimeRange) -> bool {
        let changed = self.write().entry(key.clone()).or_default().insert(range);
        if changed {
            debug!("recorded coverage for {key}: {range}");
        }
        changed
    }

    /// Sub-ranges of `range` not yet covered for `key`.
    pub fn uncovered(&self, key: &ProductKey, range: TimeRange, tolerance: i64) -> Vec<TimeRange> {
        match self.read().get(key) {
            Some(set) => set.gaps(range, tolerance),
            None if range.is_empty() => Vec::new(),
            None => vec![range],
        }
    }

    /// Fraction of `range` covered for `key` (no tolerance applied).
    pub fn coverage_ratio(&self, key: &ProductKey, range: TimeRange) -> f64 {
        match self.read().get(key) {
            Some(set) => set.coverage_ratio(range),
            None => CoverageSet::new().coverage_ratio(range),
        }
    }

    /// Snapshot of the intervals recorded for `key`, ascending.
    pub fn intervals(&self, key: &ProductKey) -> Vec<TimeRange> {
        self.read()
            .get(key)
            .map(|set| set.intervals().to_vec())
            .unwrap_or_default()
    }

    /// Keys that have at least one recorded interval, sorted.
    pub fn keys(&self) -> Vec<ProductKey> {
        let mut keys: Vec<_> = self
            .read()
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Forget everything recorded for `key`. Returns `true` if anything was
    /// removed.
    pub fn clear(&self, key: &ProductKey) -> bool {
        self.write().remove(key).is_some_and(|set| !set.is_empty())
    }
}
