//! Reader for binary columnar (Parquet) instrument files.
//!
//! Time columns may be Arrow timestamps of any unit (used directly), integer
//! or float columns (interpreted through the backend's encoding) or UTF-8
//! text. Data columns may be any integer or float width.
//!
//! The boundary pre-check prefers row-group statistics of the time column;
//! when any row group lacks them, only the time column is decoded to find
//! the bounds. Readers pull byte ranges through [`ChunkReader`], so a
//! skipped file costs its footer and (at most) its time column chunks.

use std::{fs::File, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, Float32Array, Float64Array, Int64Array, StringArray,
        TimestampNanosecondArray,
    },
    compute::cast,
    datatypes::{DataType, TimeUnit},
    error::ArrowError,
};
use bytes::Bytes;
use log::debug;
use parquet::{
    arrow::{
        ProjectionMask,
        arrow_reader::{
            ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
            statistics::StatisticsConverter,
        },
    },
    file::reader::{ChunkReader, Length},
};
use snafu::prelude::*;

use crate::{
    formats::{ColumnValues, DecodedFile, FileDecode, span_intersects},
    ingest::{
        ArrowSnafu, FileReadError, MissingTimeColumnSnafu, ParquetSnafu,
        TimeEncodingMismatchSnafu, UnsupportedFieldTypeSnafu, UnsupportedTimeTypeSnafu,
    },
    time::{NativeTime, Tick, TimeEncoding, TimeRange, normalize},
};

/// Open Parquet file shared between the metadata, scan and read passes.
///
/// Every range request clones the underlying descriptor, so passes never
/// disturb each other's position.
#[derive(Debug, Clone)]
pub struct SharedFile(Arc<File>);

impl SharedFile {
    /// Wrap an open file.
    pub fn new(file: File) -> Self {
        Self(Arc::new(file))
    }
}

impl Length for SharedFile {
    fn len(&self) -> u64 {
        self.0.len()
    }
}

impl ChunkReader for SharedFile {
    type T = <File as ChunkReader>::T;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        self.0.get_read(start)
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.0.get_bytes(start, length)
    }
}

/// How the time column's values become ticks.
#[derive(Debug, Clone, PartialEq)]
enum TimeKind {
    /// Arrow timestamp; the timezone is carried so casts keep UTC values.
    Timestamp(Option<Arc<str>>),
    Int,
    Float,
    Text,
}

impl TimeKind {
    fn classify(column: &str, datatype: &DataType, encoding: TimeEncoding) -> Result<Self, FileReadError> {
        let (kind, sample) = match datatype {
            DataType::Timestamp(_, tz) => return Ok(TimeKind::Timestamp(tz.clone())),
            dt if dt.is_integer() => (TimeKind::Int, NativeTime::Int(0)),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => {
                (TimeKind::Float, NativeTime::Float(0.0))
            }
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                (TimeKind::Text, NativeTime::Text(""))
            }
            other => {
                return UnsupportedTimeTypeSnafu {
                    column,
                    datatype: other.to_string(),
                }
                .fail();
            }
        };

        ensure!(
            encoding.accepts(&sample),
            TimeEncodingMismatchSnafu {
                column,
                kind: match kind {
                    TimeKind::Int => "int",
                    TimeKind::Float => "float",
                    _ => "text",
                },
                encoding,
            }
        );
        Ok(kind)
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef) -> Result<&'a T, FileReadError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ArrowError::CastError(format!("unexpected array type {}", array.data_type())))
        .context(ArrowSnafu)
}

/// Convert a time column into ticks. Nulls and values the encoding rejects
/// become `None`.
fn time_values(
    array: &ArrayRef,
    kind: &TimeKind,
    encoding: TimeEncoding,
) -> Result<Vec<Option<Tick>>, FileReadError> {
    let convert = |native: NativeTime<'_>| normalize(native, encoding).ok();

    let out: Vec<Option<Tick>> = match kind {
        TimeKind::Timestamp(tz) => {
            let ns = cast(array, &DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()))
                .context(ArrowSnafu)?;
            downcast::<TimestampNanosecondArray>(&ns)?.iter().collect()
        }
        TimeKind::Int => {
            let ints = cast(array, &DataType::Int64).context(ArrowSnafu)?;
            downcast::<Int64Array>(&ints)?
                .iter()
                .map(|v| v.and_then(|v| convert(NativeTime::Int(v))))
                .collect()
        }
        TimeKind::Float => {
            let floats = cast(array, &DataType::Float64).context(ArrowSnafu)?;
            downcast::<Float64Array>(&floats)?
                .iter()
                .map(|v| v.and_then(|v| convert(NativeTime::Float(v))))
                .collect()
        }
        TimeKind::Text => {
            let text = cast(array, &DataType::Utf8).context(ArrowSnafu)?;
            downcast::<StringArray>(&text)?
                .iter()
                .map(|v| v.and_then(|v| convert(NativeTime::Text(v))))
                .collect()
        }
    };
    Ok(out)
}

/// Convert a data column to its native-width representation.
fn column_values(array: &ArrayRef, column: &str) -> Result<ColumnValues, FileReadError> {
    match array.data_type() {
        DataType::Float16 | DataType::Float32 => {
            let floats = cast(array, &DataType::Float32).context(ArrowSnafu)?;
            Ok(ColumnValues::F32(downcast::<Float32Array>(&floats)?.iter().collect()))
        }
        DataType::Float64 => Ok(ColumnValues::F64(
            downcast::<Float64Array>(array)?.iter().collect(),
        )),
        dt if dt.is_integer() => {
            let ints = cast(array, &DataType::Int64).context(ArrowSnafu)?;
            Ok(ColumnValues::Int(downcast::<Int64Array>(&ints)?.iter().collect()))
        }
        other => UnsupportedFieldTypeSnafu {
            column,
            datatype: other.to_string(),
        }
        .fail(),
    }
}

/// Try to compute the time bounds from row-group statistics.
///
/// Returns `None` if stats are missing or incomplete for any row group (the
/// caller should fall back to scanning the time column). Text columns are
/// never trusted: their statistics order is lexicographic.
fn bounds_from_statistics(
    metadata: &ArrowReaderMetadata,
    time_field: &str,
    kind: &TimeKind,
    encoding: TimeEncoding,
) -> Option<(Tick, Tick)> {
    if *kind == TimeKind::Text {
        return None;
    }
    let parquet_meta = metadata.metadata();
    if parquet_meta.num_row_groups() == 0 {
        return None;
    }

    let converter =
        StatisticsConverter::try_new(time_field, metadata.schema(), metadata.parquet_schema())
            .ok()?;
    let mins = converter
        .row_group_mins(parquet_meta.row_groups().iter())
        .ok()?;
    let maxes = converter
        .row_group_maxes(parquet_meta.row_groups().iter())
        .ok()?;
    if mins.null_count() > 0 || maxes.null_count() > 0 {
        return None;
    }

    let first = time_values(&mins, kind, encoding)
        .ok()?
        .into_iter()
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .min()?;
    let last = time_values(&maxes, kind, encoding)
        .ok()?
        .into_iter()
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .max()?;
    Some((first, last))
}

fn bounds_of(times: &[Option<Tick>]) -> Option<(Tick, Tick)> {
    times.iter().flatten().fold(None, |acc, &t| match acc {
        None => Some((t, t)),
        Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
    })
}

fn read_columns<R: ChunkReader + Clone + 'static>(
    source: &R,
    metadata: &ArrowReaderMetadata,
    time_field: &str,
    kind: &TimeKind,
    encoding: TimeEncoding,
    fields: &[String],
) -> Result<DecodedFile, FileReadError> {
    let schema = metadata.schema();
    let (present, missing): (Vec<&String>, Vec<&String>) = fields
        .iter()
        .partition(|f| schema.field_with_name(f).is_ok());

    let mask = ProjectionMask::columns(
        metadata.parquet_schema(),
        std::iter::once(time_field).chain(present.iter().map(|f| f.as_str())),
    );
    let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(source.clone(), metadata.clone())
        .with_projection(mask)
        .build()
        .context(ParquetSnafu)?;

    let mut out = DecodedFile {
        missing: missing.into_iter().cloned().collect(),
        ..DecodedFile::default()
    };

    for batch_res in reader {
        let batch = batch_res.context(ArrowSnafu)?;

        let time_col = batch
            .column_by_name(time_field)
            .context(MissingTimeColumnSnafu { column: time_field })?;
        out.times.extend(time_values(time_col, kind, encoding)?);

        for name in &present {
            let col = batch
                .column_by_name(name)
                .ok_or_else(|| ArrowError::SchemaError(format!("column {name:?} missing from batch")))
                .context(ArrowSnafu)?;
            let values = column_values(col, name)?;
            match out.columns.get_mut(name.as_str()) {
                Some(existing) => existing.append(values),
                None => {
                    out.columns.insert(name.to_string(), values);
                }
            }
        }
    }

    Ok(out)
}

/// Decode a Parquet file, skipping it when its time bounds cannot
/// intersect `range`.
pub fn decode<R: ChunkReader + Clone + 'static>(
    source: R,
    time_field: &str,
    encoding: TimeEncoding,
    fields: &[String],
    range: TimeRange,
) -> Result<FileDecode, FileReadError> {
    let metadata =
        ArrowReaderMetadata::load(&source, ArrowReaderOptions::default()).context(ParquetSnafu)?;

    let time_type = metadata
        .schema()
        .field_with_name(time_field)
        .map_err(|_| FileReadError::MissingTimeColumn {
            column: time_field.to_string(),
        })?
        .data_type()
        .clone();
    let kind = TimeKind::classify(time_field, &time_type, encoding)?;

    let bounds = match bounds_from_statistics(&metadata, time_field, &kind, encoding) {
        Some(bounds) => Some(bounds),
        None => {
            debug!("no usable statistics for time column {time_field:?}; scanning it for bounds");
            let scan = read_columns(&source, &metadata, time_field, &kind, encoding, &[])?;
            bounds_of(&scan.times)
        }
    };

    if let Some((first, last)) = bounds {
        if !span_intersects(first, last, range) {
            return Ok(FileDecode::Skipped { first, last });
        }
    }

    read_columns(&source, &metadata, time_field, &kind, encoding, fields).map(FileDecode::Decoded)
}
