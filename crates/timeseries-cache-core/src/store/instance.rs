//! Immutable product snapshots and the time-ordered merge that produces them.

use std::{collections::BTreeMap, ops::Range, sync::Arc};

use crate::{
    bundle::RecordBundle,
    time::{Tick, TimeRange},
};

/// One published state of a product: sorted times plus named value arrays
/// of the same length.
///
/// Instances never change after publication. Arrays are shared behind
/// `Arc`, so views and older snapshots stay valid across updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInstance {
    times: Arc<[Tick]>,
    fields: BTreeMap<String, Arc<[f64]>>,
    version: u64,
}

impl Default for ProductInstance {
    fn default() -> Self {
        Self {
            times: Arc::from(Vec::new()),
            fields: BTreeMap::new(),
            version: 0,
        }
    }
}

/// Row counts of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MergeStats {
    pub(crate) added: usize,
    pub(crate) replaced: usize,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Old(usize),
    New(usize),
}

impl ProductInstance {
    /// Timestamps, non-decreasing.
    pub fn times(&self) -> &[Tick] {
        &self.times
    }

    /// Values of a stored field.
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(|v| &v[..])
    }

    /// Names of the stored fields, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True if the instance holds no rows.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Range spanned by the stored rows, `None` when empty.
    pub fn time_range(&self) -> Option<TimeRange> {
        let first = *self.times.first()?;
        let last = *self.times.last()?;
        Some(TimeRange::spanning(first, last.saturating_add(1)))
    }

    /// Snapshot counter: 0 for a fresh instance, incremented by each update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn times_arc(&self) -> Arc<[Tick]> {
        Arc::clone(&self.times)
    }

    pub(crate) fn field_arc(&self, name: &str) -> Option<Arc<[f64]>> {
        self.fields.get(name).cloned()
    }

    /// Rows whose time lies in `range` (all rows for `None`).
    pub fn rows_in(&self, range: Option<TimeRange>) -> Range<usize> {
        match range {
            None => 0..self.times.len(),
            Some(r) => {
                let lo = self.times.partition_point(|&t| t < r.start());
                let hi = self.times.partition_point(|&t| t < r.end());
                lo..hi.max(lo)
            }
        }
    }

    /// Build the next snapshot from this one and `bundle`.
    ///
    /// Rows are merged by time. Where both sides hold rows for the exact same
    /// timestamp, the bundle's rows replace the stored ones. Fields present
    /// on only one side are NaN on the other side's rows.
    pub(crate) fn merged(&self, bundle: RecordBundle) -> (ProductInstance, MergeStats) {
        let version = self.version + 1;
        let (new_times, new_fields) = bundle.into_parts();

        if self.is_empty() {
            let stats = MergeStats {
                added: new_times.len(),
                replaced: 0,
            };
            let mut fields: BTreeMap<String, Arc<[f64]>> = self
                .fields
                .keys()
                .map(|name| (name.clone(), Arc::from(vec![f64::NAN; new_times.len()])))
                .collect();
            fields.extend(new_fields.into_iter().map(|(name, v)| (name, Arc::from(v))));
            return (
                ProductInstance {
                    times: Arc::from(new_times),
                    fields,
                    version,
                },
                stats,
            );
        }

        let old = &self.times;
        let mut order = Vec::with_capacity(old.len() + new_times.len());
        let mut stats = MergeStats {
            added: new_times.len(),
            replaced: 0,
        };
        let (mut i, mut j) = (0, 0);
        while i < old.len() || j < new_times.len() {
            if j == new_times.len() || (i < old.len() && old[i] < new_times[j]) {
                order.push(Source::Old(i));
                i += 1;
            } else if i == old.len() || new_times[j] < old[i] {
                order.push(Source::New(j));
                j += 1;
            } else {
                // Equal timestamps: drop the stored rows, the bundle's rows
                // follow on the next iterations.
                let t = old[i];
                while i < old.len() && old[i] == t {
                    i += 1;
                    stats.replaced += 1;
                }
            }
        }

        let times: Vec<Tick> = order
            .iter()
            .map(|src| match *src {
                Source::Old(k) => old[k],
                Source::New(k) => new_times[k],
            })
            .collect();

        let mut names: Vec<&String> = self.fields.keys().collect();
        names.extend(new_fields.keys().filter(|k| !self.fields.contains_key(*k)));

        let fields = names
            .into_iter()
            .map(|name| {
                let old_vals = self.fields.get(name);
                let new_vals = new_fields.get(name);
                let values: Vec<f64> = order
                    .iter()
                    .map(|src| match *src {
                        Source::Old(k) => old_vals.and_then(|v| v.get(k)).copied(),
                        Source::New(k) => new_vals.and_then(|v| v.get(k)).copied(),
                    })
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect();
                (name.clone(), Arc::from(values))
            })
            .collect();

        (
            ProductInstance {
                times: Arc::from(times),
                fields,
                version,
            },
            stats,
        )
    }
}
