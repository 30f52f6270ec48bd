//! Canonical time representation shared by every layer of the cache.
//!
//! Every backend-native time value is normalized into one scale before any
//! comparison, merge or coverage bookkeeping happens:
//!
//! - A [`Tick`] is a signed 64-bit count of nanoseconds since the Unix epoch
//!   (1970-01-01T00:00:00Z) on the POSIX scale, so leap seconds are not
//!   counted. The representable span is roughly 1677..2262.
//! - A [`TimeRange`] is a half-open interval `[start, end)` of ticks.
//!   Zero-length ranges are legal and never contain data.
//!
//! Backend-native encodings and the conversion into ticks live in
//! [`encoding`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub mod encoding;
mod leap_seconds;

pub use encoding::{NativeTime, TimeEncoding, denormalize, normalize};

/// Canonical time value: nanoseconds since the Unix epoch (UTC, POSIX scale).
pub type Tick = i64;

/// Number of ticks in one second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Number of ticks in one hour.
pub const NANOS_PER_HOUR: i64 = 3_600 * NANOS_PER_SECOND;

/// Number of ticks in one (POSIX) day.
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Errors raised while turning native time values into ticks.
///
/// Normalization never clamps: anything that cannot be represented exactly
/// enough on the tick scale is reported here instead.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum TimeParseError {
    /// Text input did not match any accepted layout for the encoding.
    #[snafu(display("Cannot parse {input:?} as {encoding} time"))]
    Unparseable {
        /// The rejected input, verbatim.
        input: String,
        /// Encoding the input was interpreted with.
        encoding: TimeEncoding,
    },

    /// Floating point input was NaN or infinite.
    #[snafu(display("Non-finite {encoding} time value {value}"))]
    NonFinite {
        /// The rejected value.
        value: f64,
        /// Encoding the input was interpreted with.
        encoding: TimeEncoding,
    },

    /// The value is valid for its encoding but falls outside the tick range.
    #[snafu(display("{encoding} time value {value} is outside the representable tick range"))]
    OutOfRange {
        /// The rejected value, rendered as text.
        value: String,
        /// Encoding the input was interpreted with.
        encoding: TimeEncoding,
    },

    /// The encoding does not accept this kind of native value
    /// (for example a float handed to `tt2000`).
    #[snafu(display("{encoding} time does not accept {kind} input"))]
    WrongKind {
        /// Kind of native value that was supplied (`int`, `float`, `text`).
        kind: &'static str,
        /// Encoding the input was interpreted with.
        encoding: TimeEncoding,
    },

    /// A range was requested with `start > end`.
    #[snafu(display("Invalid time range: start={start}, end={end} (expect start <= end)"))]
    InvertedRange {
        /// Requested lower bound.
        start: Tick,
        /// Requested upper bound.
        end: Tick,
    },
}

/// Convert a `DateTime<Utc>` into a tick.
///
/// Fails for instants outside the i64-nanosecond span.
pub fn tick_from_datetime(dt: DateTime<Utc>) -> Result<Tick, TimeParseError> {
    dt.timestamp_nanos_opt().ok_or_else(|| TimeParseError::OutOfRange {
        value: dt.to_rfc3339(),
        encoding: TimeEncoding::Calendar,
    })
}

/// Convert a tick back into a `DateTime<Utc>`. Every tick is representable.
pub fn datetime_from_tick(tick: Tick) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(tick)
}

/// Half-open interval `[start, end)` on the tick scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    start: Tick,
    end: Tick,
}

impl TimeRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: Tick, end: Tick) -> Result<Self, TimeParseError> {
        ensure!(start <= end, InvertedRangeSnafu { start, end });
        Ok(Self { start, end })
    }

    /// Build the range between two ticks given in either order.
    pub(crate) fn spanning(a: Tick, b: Tick) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Build a range from two UTC instants.
    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeParseError> {
        Self::new(tick_from_datetime(start)?, tick_from_datetime(end)?)
    }

    /// Parse a range from two calendar strings (see [`TimeEncoding::Calendar`]).
    ///
    /// ```
    /// use timeseries_cache_core::time::TimeRange;
    ///
    /// let day = TimeRange::parse("2020-01-01", "2020-01-02").unwrap();
    /// assert_eq!(day.len(), 86_400_000_000_000);
    /// ```
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeParseError> {
        let start = normalize(NativeTime::Text(start), TimeEncoding::Calendar)?;
        let end = normalize(NativeTime::Text(end), TimeEncoding::Calendar)?;
        Self::new(start, end)
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> Tick {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> Tick {
        self.end
    }

    /// Length in ticks.
    pub fn len(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    /// True for zero-length ranges.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True iff `start <= tick < end`.
    pub fn contains(&self, tick: Tick) -> bool {
        self.start <= tick && tick < self.end
    }

    /// True iff the two ranges share at least one tick.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True iff the ranges overlap or share a boundary, i.e. their union is
    /// a single interval.
    pub fn touches_or_overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Intersection of two ranges, `None` when it would be empty.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }

    /// Grow the range by `tolerance` ticks on each side (saturating).
    /// Negative tolerances are treated as zero.
    pub fn expand(&self, tolerance: i64) -> TimeRange {
        let tol = tolerance.max(0);
        TimeRange {
            start: self.start.saturating_sub(tol),
            end: self.end.saturating_add(tol),
        }
    }

    /// Lower bound as a UTC instant.
    pub fn start_datetime(&self) -> DateTime<Utc> {
        datetime_from_tick(self.start)
    }

    /// Upper bound as a UTC instant.
    pub fn end_datetime(&self) -> DateTime<Utc> {
        datetime_from_tick(self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start_datetime()
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end_datetime().to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}
