//! File format readers.
//!
//! Each reader turns one file into a [`DecodedFile`]: the time
//! column already normalized to ticks, plus the requested data columns in
//! their native numeric width. Before decoding everything, readers run a
//! cheap boundary pre-check and report [`FileDecode::Skipped`] for files
//! that cannot intersect the request.
//!
//! Readers are synchronous; the pipeline runs them on the blocking pool.

use std::{collections::BTreeMap, fs::File, io::Read};

use bytes::Bytes;
use snafu::prelude::*;

use crate::{
    config::{BackendDescriptor, BackendKind},
    ingest::{FileReadError, ReadLocalSnafu},
    time::{Tick, TimeRange},
};

pub mod delimited;
pub mod parquet;

/// Values of one data column in the width they were stored with.
///
/// Nulls are `None`. Keeping the native width lets fill sentinels be
/// compared exactly (an `f32` sentinel of `-1e31` does not equal the `f64`
/// literal `-1e31`).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// 32-bit floats (and narrower floats widened to 32 bits).
    F32(Vec<Option<f32>>),
    /// 64-bit floats.
    F64(Vec<Option<f64>>),
    /// Integers of any width, widened to `i64`.
    Int(Vec<Option<i64>>),
}

impl ColumnValues {
    /// Number of values, nulls included.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::F32(v) => v.len(),
            ColumnValues::F64(v) => v.len(),
            ColumnValues::Int(v) => v.len(),
        }
    }

    /// True if the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `other`, widening to `F64` when the variants differ.
    pub(crate) fn append(&mut self, other: ColumnValues) {
        if std::mem::discriminant(self) != std::mem::discriminant(&other) {
            let mut widened = self.to_f64_lossy();
            widened.extend(other.to_f64_lossy());
            *self = ColumnValues::F64(widened);
            return;
        }
        match (self, other) {
            (ColumnValues::F32(a), ColumnValues::F32(b)) => a.extend(b),
            (ColumnValues::F64(a), ColumnValues::F64(b)) => a.extend(b),
            (ColumnValues::Int(a), ColumnValues::Int(b)) => a.extend(b),
            _ => {}
        }
    }

    fn to_f64_lossy(&self) -> Vec<Option<f64>> {
        match self {
            ColumnValues::F32(v) => v.iter().map(|x| x.map(f64::from)).collect(),
            ColumnValues::F64(v) => v.clone(),
            ColumnValues::Int(v) => v.iter().map(|x| x.map(|i| i as f64)).collect(),
        }
    }
}

/// Decoded contents of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFile {
    /// Normalized times; `None` where the stored time was null or could not
    /// be interpreted.
    pub times: Vec<Option<Tick>>,
    /// Requested columns present in the file, each as long as `times`.
    pub columns: BTreeMap<String, ColumnValues>,
    /// Requested columns absent from the file.
    pub missing: Vec<String>,
}

/// Result of reading one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileDecode {
    /// The pre-check showed the file lies entirely outside the request.
    Skipped {
        /// Earliest time in the file.
        first: Tick,
        /// Latest time in the file.
        last: Tick,
    },
    /// The file was decoded.
    Decoded(DecodedFile),
}

/// True when the closed span `[first, last]` shares a tick with `range`.
pub(crate) fn span_intersects(first: Tick, last: Tick, range: TimeRange) -> bool {
    let (lo, hi) = if first <= last {
        (first, last)
    } else {
        (last, first)
    };
    lo < range.end() && hi >= range.start()
}

/// Where a file's contents come from.
#[derive(Debug)]
pub enum FileSource {
    /// Contents already in memory.
    Bytes(Bytes),
    /// Open handle; columnar readers fetch only the ranges they need.
    File(File),
}

impl FileSource {
    fn into_bytes(self) -> Result<Bytes, FileReadError> {
        match self {
            FileSource::Bytes(data) => Ok(data),
            FileSource::File(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).context(ReadLocalSnafu)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Decode one file according to its backend.
pub fn decode_file(
    source: FileSource,
    descriptor: &BackendDescriptor,
    fields: &[String],
    range: TimeRange,
) -> Result<FileDecode, FileReadError> {
    let time_field = descriptor.time_field();
    let encoding = descriptor.time_encoding();
    match (descriptor.kind(), source) {
        (BackendKind::BinaryColumnar, FileSource::Bytes(data)) => {
            parquet::decode(data, time_field, encoding, fields, range)
        }
        (BackendKind::BinaryColumnar, FileSource::File(file)) => parquet::decode(
            parquet::SharedFile::new(file),
            time_field,
            encoding,
            fields,
            range,
        ),
        (BackendKind::DailyDelimited(options), source) => delimited::decode(
            &source.into_bytes()?,
            options,
            time_field,
            encoding,
            fields,
            range,
        ),
    }
}
