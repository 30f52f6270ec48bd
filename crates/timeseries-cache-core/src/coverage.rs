//! In-memory coverage and gap analysis over the tick scale.
//!
//! This module is intentionally small and generic:
//!
//! - [`CoverageSet`] is an ordered list of disjoint, non-adjacent
//!   [`TimeRange`]s recording which spans have already been ingested.
//! - [`CoverageTracker`] keeps one set per [`ProductKey`](crate::ProductKey)
//!   behind a lock so the orchestrator can share it.
//! - Neither knows about files, backends or the product store.
//!
//! Typical usage:
//!
//! ```
//! use timeseries_cache_core::coverage::CoverageSet;
//! use timeseries_cache_core::time::TimeRange;
//!
//! let mut set = CoverageSet::new();
//! set.insert(TimeRange::new(0, 50).unwrap());
//! set.insert(TimeRange::new(50, 100).unwrap()); // touching: merged
//! assert_eq!(set.len(), 1);
//!
//! assert!(set.covers(TimeRange::new(10, 90).unwrap(), 0));
//! assert!(!set.covers(TimeRange::new(10, 110).unwrap(), 0));
//! assert!(set.covers(TimeRange::new(10, 110).unwrap(), 10));
//!
//! let gaps = set.gaps(TimeRange::new(-20, 120).unwrap(), 0);
//! assert_eq!(gaps.len(), 2);
//! ```

pub mod tracker;

pub use tracker::CoverageTracker;

use crate::time::TimeRange;

/// Ordered, non-overlapping, non-adjacent set of covered ranges.
///
/// Invariant: for consecutive entries `a`, `b`: `a.end() < b.start()`, and
/// no entry is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSet {
    intervals: Vec<TimeRange>,
}

impl CoverageSet {
    /// Construct an empty set (nothing covered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of disjoint intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Recorded intervals in ascending order.
    pub fn intervals(&self) -> &[TimeRange] {
        &self.intervals
    }

    /// Iterate over the recorded intervals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.intervals.iter()
    }

    /// Record `range` as covered.
    ///
    /// Sorted-interval merge: the insertion point is located by `start`, and
    /// every existing interval that intersects or touches `range` is absorbed
    /// into a single entry. Absorbing the whole touching run at once leaves
    /// the set stable after one pass. Empty ranges are ignored.
    ///
    /// Returns `true` if the set changed.
    pub fn insert(&mut self, range: TimeRange) -> bool {
        if range.is_empty() {
            return false;
        }

        // First interval that could touch `range`: its end reaches range.start.
        let lo = self
            .intervals
            .partition_point(|iv| iv.end() < range.start());
        // One past the last interval whose start is still within reach.
        let hi = lo
            + self.intervals[lo..].partition_point(|iv| iv.start() <= range.end());

        if lo == hi {
            self.intervals.insert(lo, range);
            return true;
        }

        let start = range.start().min(self.intervals[lo].start());
        let end = range.end().max(self.intervals[hi - 1].end());

        if hi - lo == 1 && self.intervals[lo].start() == start && self.intervals[lo].end() == end {
            // Already fully contained.
            return false;
        }

        self.intervals
            .splice(lo..hi, [TimeRange::spanning(start, end)]);
        true
    }

    /// True iff both bounds of `range` fall inside one connected piece of the
    /// recorded coverage, after expanding every interval outward by
    /// `tolerance` ticks.
    ///
    /// Partial overlap is never enough: a range that sticks out of the
    /// coverage, or spans a gap wider than `2 * tolerance`, is not covered.
    pub fn covers(&self, range: TimeRange, tolerance: i64) -> bool {
        let tol = tolerance.max(0);

        // Last interval whose expanded start is at or before range.start.
        let idx = self
            .intervals
            .partition_point(|iv| iv.start().saturating_sub(tol) <= range.start());
        if idx == 0 {
            return false;
        }

        let first = self.intervals[idx - 1].expand(tol);
        if range.start() > first.end() {
            return false;
        }

        // Walk forward while expanded intervals chain into each other.
        let mut reach = first.end();
        for iv in &self.intervals[idx..] {
            if reach >= range.end() {
                break;
            }
            let expanded = iv.expand(tol);
            if expanded.start() > reach {
                break;
            }
            reach = reach.max(expanded.end());
        }

        range.end() <= reach
    }

    /// Sub-ranges of `range` that are not covered by the tolerance-expanded
    /// intervals, in ascending order. Empty for an empty `range`.
    pub fn gaps(&self, range: TimeRange, tolerance: i64) -> Vec<TimeRange> {
        let mut out = Vec::new();
        if range.is_empty() {
            return out;
        }

        let mut cursor = range.start();
        for iv in &self.intervals {
            let expanded = iv.expand(tolerance);
            if expanded.end() <= cursor {
                continue;
            }
            if expanded.start() >= range.end() {
                break;
            }
            if expanded.start() > cursor {
                out.push(TimeRange::spanning(cursor, expanded.start()));
            }
            cursor = cursor.max(expanded.end());
            if cursor >= range.end() {
                return out;
            }
        }

        if cursor < range.end() {
            out.push(TimeRange::spanning(cursor, range.end()));
        }
        out
    }

    /// Number of ticks of `range` covered by the recorded intervals
    /// (no tolerance applied).
    pub fn covered_len(&self, range: TimeRange) -> u64 {
        self.intervals
            .iter()
            .filter_map(|iv| iv.intersect(&range))
            .map(|iv| iv.len())
            .sum()
    }

    /// Coverage ratio in `[0.0, 1.0]` relative to `range`.
    ///
    /// For an empty `range` this returns `1.0` by convention (vacuous full
    /// coverage).
    pub fn coverage_ratio(&self, range: TimeRange) -> f64 {
        if range.is_empty() {
            return 1.0;
        }
        self.covered_len(range) as f64 / range.len() as f64
    }
}

impl FromIterator<TimeRange> for CoverageSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TimeRange>,
    {
        let mut set = CoverageSet::new();
        for range in iter {
            set.insert(range);
        }
        set
    }
}
