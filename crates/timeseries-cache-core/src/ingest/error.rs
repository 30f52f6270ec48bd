use std::{fmt, path::PathBuf, time::Duration};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::{
    bundle::BundleError,
    config::ConfigError,
    product::ProductKey,
    storage::StorageError,
    time::{Tick, TimeEncoding, TimeParseError, TimeRange, datetime_from_tick},
};

/// Coarse classification of [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown product, bad template or undeclared field.
    Config,
    /// The requested range could not be interpreted.
    TimeParse,
    /// No file was located, or every located file failed.
    NoDataFound,
    /// A merged field length disagrees with the timestamps.
    LengthMismatch,
    /// Merged timestamps are not non-decreasing.
    Unsorted,
}

/// Fatal pipeline failures. None of them carries a partial result.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// Backend resolution or field projection failed.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },

    /// The request's time bounds are invalid.
    #[snafu(display("Invalid request time: {source}"))]
    TimeParse {
        /// Underlying parse error.
        source: TimeParseError,
    },

    /// Nothing could be read for the request.
    #[snafu(display("No data found for {key} in {range} ({} notice(s))", notices.len()))]
    NoDataFound {
        /// Requested product.
        key: ProductKey,
        /// Requested range.
        range: TimeRange,
        /// What went wrong for each slot or file.
        notices: Vec<Degradation>,
    },

    /// The merged bundle failed validation.
    #[snafu(display("Merged data for {key} is inconsistent: {source}"))]
    Invariant {
        /// Requested product.
        key: ProductKey,
        /// The violated invariant.
        source: BundleError,
    },
}

impl PipelineError {
    /// Classification of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config { .. } => ErrorKind::Config,
            PipelineError::TimeParse { .. } => ErrorKind::TimeParse,
            PipelineError::NoDataFound { .. } => ErrorKind::NoDataFound,
            PipelineError::Invariant { source, .. } => match source {
                BundleError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
                BundleError::Unsorted { .. } => ErrorKind::Unsorted,
            },
        }
    }

    /// Whether a partial result accompanies the error. Always `false`:
    /// partial results are reported as notices on a successful outcome.
    pub fn is_partial(&self) -> bool {
        false
    }

    /// Notices collected before the failure, if any.
    pub fn notices(&self) -> &[Degradation] {
        match self {
            PipelineError::NoDataFound { notices, .. } => notices,
            _ => &[],
        }
    }
}

/// Non-fatal conditions recorded while ingesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// No file exists for a time slot (partial coverage).
    MissingFile {
        /// Ticks the slot covers.
        slot: TimeRange,
        /// Rendering of the first template, relative to the archive root.
        path: PathBuf,
    },
    /// A requested field is absent from a file and was filled with NaN.
    FieldMissing {
        /// File lacking the field.
        path: PathBuf,
        /// The missing field.
        field: String,
    },
    /// The file's time bounds do not intersect the request.
    FileSkipped {
        /// Skipped file.
        path: PathBuf,
        /// Earliest time in the file.
        first: Tick,
        /// Latest time in the file.
        last: Tick,
    },
    /// The file could not be read or decoded, or timed out.
    ///
    /// The slot stays unrecorded so a later request retries it.
    FileFailed {
        /// Ticks the slot covers.
        slot: TimeRange,
        /// Failed file.
        path: PathBuf,
        /// Rendered error chain.
        reason: String,
    },
}

impl Degradation {
    /// True for notices that leave part of the request without data.
    pub fn is_partial_coverage(&self) -> bool {
        matches!(
            self,
            Degradation::MissingFile { .. } | Degradation::FileFailed { .. }
        )
    }

    /// Slot of a file that exists but could not be read.
    pub fn failed_slot(&self) -> Option<TimeRange> {
        match self {
            Degradation::FileFailed { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingFile { slot, path } => {
                write!(f, "missing file {} for {slot}", path.display())
            }
            Degradation::FieldMissing { path, field } => {
                write!(f, "field {field:?} absent from {}", path.display())
            }
            Degradation::FileSkipped { path, first, last } => write!(
                f,
                "skipped {} (spans {} .. {})",
                path.display(),
                datetime_from_tick(*first),
                datetime_from_tick(*last)
            ),
            Degradation::FileFailed { path, reason, .. } => {
                write!(f, "failed to read {}: {reason}", path.display())
            }
        }
    }
}

/// Per-file failures. These never abort a run; the pipeline turns each into
/// [`Degradation::FileFailed`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FileReadError {
    /// The file could not be read from storage.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// An already opened file could not be read.
    #[snafu(display("Read error: {source}"))]
    ReadLocal {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Parquet metadata or pages could not be decoded.
    #[snafu(display("Parquet read error: {source}"))]
    Parquet {
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow decoding or casting failed.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The file has no column named after the backend's time field.
    #[snafu(display("Time column {column:?} not found"))]
    MissingTimeColumn {
        /// Expected time column.
        column: String,
    },

    /// The time column's type cannot hold times.
    #[snafu(display("Unsupported type {datatype} for time column {column:?}"))]
    UnsupportedTimeType {
        /// Time column.
        column: String,
        /// Its Arrow type.
        datatype: String,
    },

    /// A data column is not numeric.
    #[snafu(display("Unsupported type {datatype} for field {column:?}"))]
    UnsupportedFieldType {
        /// Data column.
        column: String,
        /// Its Arrow type.
        datatype: String,
    },

    /// The time column's kind does not match the declared encoding.
    #[snafu(display("Time column {column:?} holds {kind} values, which {encoding} does not accept"))]
    TimeEncodingMismatch {
        /// Time column.
        column: String,
        /// Kind of values found.
        kind: &'static str,
        /// Declared encoding.
        encoding: TimeEncoding,
    },

    /// A delimited file is not valid UTF-8.
    #[snafu(display("Delimited file is not UTF-8: {source}"))]
    NotUtf8 {
        /// Underlying decoding error.
        source: std::str::Utf8Error,
    },

    /// A delimited file has no header line.
    #[snafu(display("Delimited file has no header line"))]
    EmptyDelimited,

    /// Reading and decoding exceeded the configured timeout.
    #[snafu(display("Timed out after {after:?}"))]
    Timeout {
        /// Configured limit.
        after: Duration,
    },

    /// The decode task panicked or was cancelled.
    #[snafu(display("Decode task failed: {source}"))]
    Task {
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}
