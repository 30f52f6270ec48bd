//! Backend-native time encodings and their conversion into ticks.
//!
//! Each backend declares the encoding of its time field. Values are handed to
//! [`normalize`] as a [`NativeTime`] (integer, float or text) and come back as
//! a [`Tick`]. Within one encoding the mapping is order preserving, and
//! integer encodings are exact to the nanosecond.
//!
//! Numeric encodings also accept text (as found in delimited files), which is
//! parsed as an integer first and as a float second.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{NANOS_PER_SECOND, Tick, TimeParseError, leap_seconds};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Milliseconds between 0000-01-01T00:00:00 and the Unix epoch.
const CDF_EPOCH_UNIX_OFFSET_MS: f64 = 62_167_219_200_000.0;

/// `unix_nanos + ΔAT·1e9 - TT2000` for any instant, where ΔAT is TAI−UTC.
///
/// J2000 is 2000-01-01T12:00:00 TT = 2000-01-01T11:58:55.816 UTC.
const TT2000_UNIX_OFFSET_NS: i64 = 946_727_967_816_000_000;

/// Time encodings understood by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoding {
    /// Seconds since the Unix epoch, integer or fractional.
    UnixSeconds,
    /// Milliseconds since the Unix epoch, integer or fractional.
    UnixMillis,
    /// Nanoseconds since the Unix epoch (the tick scale itself).
    UnixNanos,
    /// Calendar text: `YYYY-MM-DD`, `YYYYMMDD`, `YYYY-DDD`,
    /// `YYYY-MM-DD[T ]HH:MM[:SS[.fff]]` or RFC 3339.
    Calendar,
    /// Milliseconds since 0000-01-01T00:00:00 as a float
    /// (the classic instrument `EPOCH` type).
    CdfEpoch,
    /// Nanoseconds since J2000 in Terrestrial Time, leap seconds included
    /// (the instrument binary epoch tick).
    Tt2000,
}

impl TimeEncoding {
    /// True if `native` is a kind of value this encoding can interpret.
    pub fn accepts(&self, native: &NativeTime<'_>) -> bool {
        matches!(
            (self, native),
            (_, NativeTime::Text(_))
                | (Self::UnixSeconds | Self::UnixMillis | Self::CdfEpoch, _)
                | (Self::UnixNanos | Self::Tt2000, NativeTime::Int(_))
        )
    }
}

impl fmt::Display for TimeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnixSeconds => "unix_seconds",
            Self::UnixMillis => "unix_millis",
            Self::UnixNanos => "unix_nanos",
            Self::Calendar => "calendar",
            Self::CdfEpoch => "cdf_epoch",
            Self::Tt2000 => "tt2000",
        };
        f.write_str(name)
    }
}

/// A single backend-native time value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeTime<'a> {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Textual value.
    Text(&'a str),
}

impl NativeTime<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

/// Convert one native time value into a tick.
///
/// ```
/// use timeseries_cache_core::time::{NativeTime, TimeEncoding, normalize};
///
/// let tick = normalize(NativeTime::Float(1.5), TimeEncoding::UnixSeconds).unwrap();
/// assert_eq!(tick, 1_500_000_000);
///
/// let tick = normalize(NativeTime::Text("1970-01-02"), TimeEncoding::Calendar).unwrap();
/// assert_eq!(tick, 86_400_000_000_000);
/// ```
pub fn normalize(native: NativeTime<'_>, encoding: TimeEncoding) -> Result<Tick, TimeParseError> {
    use NativeTime::{Float, Int, Text};
    use TimeEncoding::*;

    match (encoding, native) {
        (Calendar, Text(s)) => parse_calendar(s),
        (_, Text(s)) => normalize(parse_number(s, encoding)?, encoding),

        (UnixSeconds, Int(v)) => scale_int(v, NANOS_PER_SECOND, encoding),
        (UnixSeconds, Float(v)) => scale_float(v, NANOS_PER_SECOND, encoding),
        (UnixMillis, Int(v)) => scale_int(v, NANOS_PER_MILLI, encoding),
        (UnixMillis, Float(v)) => scale_float(v, NANOS_PER_MILLI, encoding),
        (UnixNanos, Int(v)) => Ok(v),
        (CdfEpoch, Int(v)) => cdf_epoch_to_tick(v as f64),
        (CdfEpoch, Float(v)) => cdf_epoch_to_tick(v),
        (Tt2000, Int(v)) => tt2000_to_tick(v),

        (encoding, other) => Err(TimeParseError::WrongKind {
            kind: other.kind(),
            encoding,
        }),
    }
}

/// Convert a tick back into the native representation of a numeric encoding.
///
/// `calendar` has no numeric form and yields [`TimeParseError::WrongKind`].
pub fn denormalize(tick: Tick, encoding: TimeEncoding) -> Result<NativeTime<'static>, TimeParseError> {
    let secs = tick.div_euclid(NANOS_PER_SECOND);
    let sub = tick.rem_euclid(NANOS_PER_SECOND);
    match encoding {
        TimeEncoding::UnixSeconds => Ok(NativeTime::Float(
            secs as f64 + sub as f64 / NANOS_PER_SECOND as f64,
        )),
        TimeEncoding::UnixMillis => Ok(NativeTime::Float(
            tick.div_euclid(NANOS_PER_MILLI) as f64
                + tick.rem_euclid(NANOS_PER_MILLI) as f64 / NANOS_PER_MILLI as f64,
        )),
        TimeEncoding::UnixNanos => Ok(NativeTime::Int(tick)),
        TimeEncoding::CdfEpoch => Ok(NativeTime::Float(
            tick as f64 / NANOS_PER_MILLI as f64 + CDF_EPOCH_UNIX_OFFSET_MS,
        )),
        TimeEncoding::Tt2000 => {
            let leap = leap_seconds::tai_minus_utc(secs);
            tick.checked_add(leap * NANOS_PER_SECOND)
                .and_then(|v| v.checked_sub(TT2000_UNIX_OFFSET_NS))
                .map(NativeTime::Int)
                .ok_or_else(|| TimeParseError::OutOfRange {
                    value: tick.to_string(),
                    encoding,
                })
        }
        TimeEncoding::Calendar => Err(TimeParseError::WrongKind {
            kind: "text",
            encoding,
        }),
    }
}

fn parse_number(s: &str, encoding: TimeEncoding) -> Result<NativeTime<'static>, TimeParseError> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(NativeTime::Int(v));
    }
    match trimmed.parse::<f64>() {
        Ok(v) => Ok(NativeTime::Float(v)),
        Err(_) => Err(TimeParseError::Unparseable {
            input: s.to_string(),
            encoding,
        }),
    }
}

fn scale_int(value: i64, scale: i64, encoding: TimeEncoding) -> Result<Tick, TimeParseError> {
    value
        .checked_mul(scale)
        .ok_or_else(|| TimeParseError::OutOfRange {
            value: value.to_string(),
            encoding,
        })
}

/// Scale a float unit count to ticks, splitting whole and fractional parts
/// first so large epoch values keep their sub-unit precision.
fn scale_float(value: f64, scale: i64, encoding: TimeEncoding) -> Result<Tick, TimeParseError> {
    if !value.is_finite() {
        return Err(TimeParseError::NonFinite { value, encoding });
    }
    let out_of_range = || TimeParseError::OutOfRange {
        value: value.to_string(),
        encoding,
    };

    let whole = value.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the bound must be exclusive.
    if whole >= i64::MAX as f64 || whole < i64::MIN as f64 {
        return Err(out_of_range());
    }
    let frac_ticks = ((value - whole) * scale as f64).round() as i64;

    (whole as i64)
        .checked_mul(scale)
        .and_then(|t| t.checked_add(frac_ticks))
        .ok_or_else(out_of_range)
}

fn cdf_epoch_to_tick(ms: f64) -> Result<Tick, TimeParseError> {
    if !ms.is_finite() {
        return Err(TimeParseError::NonFinite {
            value: ms,
            encoding: TimeEncoding::CdfEpoch,
        });
    }
    scale_float(
        ms - CDF_EPOCH_UNIX_OFFSET_MS,
        NANOS_PER_MILLI,
        TimeEncoding::CdfEpoch,
    )
}

/// TT2000 to ticks.
///
/// Values inside an inserted leap second (23:59:60.x UTC) have no POSIX
/// representation; they collapse onto the first tick of the following
/// second, which keeps the mapping non-decreasing.
fn tt2000_to_tick(tt: i64) -> Result<Tick, TimeParseError> {
    let tai_like = tt
        .checked_add(TT2000_UNIX_OFFSET_NS)
        .ok_or_else(|| TimeParseError::OutOfRange {
            value: tt.to_string(),
            encoding: TimeEncoding::Tt2000,
        })?;
    Ok(leap_seconds::utc_from_tai_like(tai_like))
}

fn parse_calendar(input: &str) -> Result<Tick, TimeParseError> {
    const DATETIME_LAYOUTS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    const DATE_LAYOUTS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y-%j"];

    let s = input.trim();
    let unparseable = || TimeParseError::Unparseable {
        input: input.to_string(),
        encoding: TimeEncoding::Calendar,
    };

    let naive = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.naive_utc()
    } else if let Some(dt) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
    {
        dt
    } else {
        DATE_LAYOUTS
            .iter()
            .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(unparseable)?
    };

    naive
        .and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| TimeParseError::OutOfRange {
            value: input.to_string(),
            encoding: TimeEncoding::Calendar,
        })
}
