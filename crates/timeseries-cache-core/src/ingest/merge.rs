//! Concatenate per-file slices and sort them into one bundle.

use std::collections::BTreeMap;

use rayon::prelude::*;
use snafu::prelude::*;

use crate::{
    bundle::{BundleError, LengthMismatchSnafu, RecordBundle},
    ingest::extract::FileSlice,
    time::Tick,
};

/// Concatenate `slices` in the given order, then apply one stable sort
/// permutation of the combined times to every field.
///
/// Every field in `fields` is present in the result. A slice whose field
/// length disagrees with its times is reported as
/// [`BundleError::LengthMismatch`].
pub(crate) fn concat_and_sort(
    slices: Vec<FileSlice>,
    fields: &[String],
) -> Result<RecordBundle, BundleError> {
    let total: usize = slices.iter().map(|s| s.times.len()).sum();
    let mut times: Vec<Tick> = Vec::with_capacity(total);
    let mut columns: BTreeMap<String, Vec<f64>> = fields
        .iter()
        .map(|f| (f.clone(), Vec::with_capacity(total)))
        .collect();

    for slice in slices {
        let rows = slice.times.len();
        times.extend(slice.times);
        for (name, values) in slice.fields {
            if let Some(column) = columns.get_mut(&name) {
                ensure!(
                    values.len() == rows,
                    LengthMismatchSnafu {
                        field: name.as_str(),
                        len: values.len(),
                        expected: rows,
                    }
                );
                column.extend(values);
            }
        }
    }

    if times.windows(2).any(|w| w[0] > w[1]) {
        let mut order: Vec<usize> = (0..times.len()).collect();
        // `sort_by_key` is stable: ties keep discovery order.
        order.sort_by_key(|&i| times[i]);
        times = order.iter().map(|&i| times[i]).collect();
        columns.par_iter_mut().for_each(|(_, values)| {
            if values.len() == order.len() {
                *values = order.iter().map(|&i| values[i]).collect();
            }
        });
    }

    RecordBundle::new(times, columns)
}
