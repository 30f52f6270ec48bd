//! Per-file field extraction: fill replacement, range slicing, gap filling.

use std::{collections::BTreeMap, path::Path};

use log::warn;

use crate::{
    formats::{ColumnValues, DecodedFile},
    ingest::Degradation,
    time::{Tick, TimeRange},
};

/// Rows of one file that fall inside the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FileSlice {
    pub(crate) times: Vec<Tick>,
    pub(crate) fields: BTreeMap<String, Vec<f64>>,
}

/// Convert a column to `f64`, turning nulls and the fill sentinel into NaN.
///
/// The sentinel is compared in the column's own width.
fn replace_fill(column: ColumnValues, sentinel: Option<f64>) -> Vec<f64> {
    match column {
        ColumnValues::F64(values) => values
            .into_iter()
            .map(|v| match v {
                Some(x) if Some(x) != sentinel => x,
                _ => f64::NAN,
            })
            .collect(),
        ColumnValues::F32(values) => {
            let fill = sentinel.map(|s| s as f32);
            values
                .into_iter()
                .map(|v| match v {
                    Some(x) if Some(x) != fill => f64::from(x),
                    _ => f64::NAN,
                })
                .collect()
        }
        ColumnValues::Int(values) => {
            // A fractional sentinel can never match an integer column.
            let fill = sentinel
                .filter(|s| s.fract() == 0.0 && *s >= i64::MIN as f64 && *s < i64::MAX as f64)
                .map(|s| s as i64);
            values
                .into_iter()
                .map(|v| match v {
                    Some(x) if Some(x) != fill => x as f64,
                    _ => f64::NAN,
                })
                .collect()
        }
    }
}

/// Reduce a decoded file to the rows with a valid time inside `range`.
///
/// Requested fields absent from the file come back as NaN arrays, each with
/// a [`Degradation::FieldMissing`] notice pushed to `notices`.
pub(crate) fn extract(
    decoded: DecodedFile,
    fields: &[String],
    sentinel: Option<f64>,
    range: TimeRange,
    path: &Path,
    notices: &mut Vec<Degradation>,
) -> FileSlice {
    let DecodedFile {
        times,
        mut columns,
        missing,
    } = decoded;

    let keep: Vec<bool> = times
        .iter()
        .map(|t| t.is_some_and(|t| range.contains(t)))
        .collect();
    let kept_times: Vec<Tick> = times.into_iter().flatten().filter(|t| range.contains(*t)).collect();

    let mut out = FileSlice {
        times: kept_times,
        fields: BTreeMap::new(),
    };

    for field in fields {
        let values = match columns.remove(field) {
            Some(column) => replace_fill(column, sentinel)
                .into_iter()
                .zip(&keep)
                .filter_map(|(v, keep)| keep.then_some(v))
                .collect(),
            None => {
                if missing.contains(field) {
                    warn!(
                        "Field {field:?} absent from {}; filling with NaN",
                        path.display()
                    );
                    notices.push(Degradation::FieldMissing {
                        path: path.to_path_buf(),
                        field: field.clone(),
                    });
                }
                vec![f64::NAN; out.times.len()]
            }
        };
        out.fields.insert(field.clone(), values);
    }

    out
}
