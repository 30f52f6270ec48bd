//! The unit of data handed from the ingestion pipeline to the store.

use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::time::{Tick, TimeRange};

/// Violations of the bundle invariant.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum BundleError {
    /// A field's length differs from the number of timestamps.
    #[snafu(display("Field {field:?} has {len} values but there are {expected} timestamps"))]
    LengthMismatch {
        /// Offending field.
        field: String,
        /// Its length.
        len: usize,
        /// Number of timestamps.
        expected: usize,
    },

    /// Timestamps decrease somewhere.
    #[snafu(display("Timestamps are not sorted: {prev} is followed by {next} at index {index}"))]
    Unsorted {
        /// Index of the first out-of-order timestamp.
        index: usize,
        /// Timestamp before it.
        prev: Tick,
        /// The out-of-order timestamp.
        next: Tick,
    },
}

/// Timestamps in non-decreasing order plus equally long named value arrays.
///
/// The invariant is checked by every constructor, so a `RecordBundle` held
/// anywhere in the crate is always well-formed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBundle {
    times: Vec<Tick>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl RecordBundle {
    /// Validate and wrap the arrays.
    pub fn new(times: Vec<Tick>, fields: BTreeMap<String, Vec<f64>>) -> Result<Self, BundleError> {
        for (name, values) in &fields {
            ensure!(
                values.len() == times.len(),
                LengthMismatchSnafu {
                    field: name.as_str(),
                    len: values.len(),
                    expected: times.len(),
                }
            );
        }
        if let Some(index) = times.windows(2).position(|w| w[0] > w[1]) {
            return UnsortedSnafu {
                index: index + 1,
                prev: times[index],
                next: times[index + 1],
            }
            .fail();
        }
        Ok(Self { times, fields })
    }

    /// A bundle with no rows whose fields are all present and empty.
    pub fn empty<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            times: Vec::new(),
            fields: fields.into_iter().map(|f| (f.into(), Vec::new())).collect(),
        }
    }

    /// Timestamps, non-decreasing.
    pub fn times(&self) -> &[Tick] {
        &self.times
    }

    /// Values of one field.
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// All fields by name.
    pub fn fields(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.fields
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True if the bundle has no rows.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Smallest range containing every timestamp, `None` when empty.
    pub fn time_span(&self) -> Option<TimeRange> {
        let first = *self.times.first()?;
        let last = *self.times.last()?;
        Some(TimeRange::spanning(first, last.saturating_add(1)))
    }

    /// Take the arrays apart.
    pub fn into_parts(self) -> (Vec<Tick>, BTreeMap<String, Vec<f64>>) {
        (self.times, self.fields)
    }
}
