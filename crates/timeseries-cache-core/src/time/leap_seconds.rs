//! TAI−UTC offsets (ΔAT) used by the TT2000 conversion.
//!
//! The table lists the Unix second at which each offset takes effect. Before
//! 1972 the offset is held at its first tabulated value.

use super::{NANOS_PER_SECOND, Tick};

const LEAP_TABLE: [(i64, i64); 28] = [
    (63_072_000, 10),    // 1972-01-01
    (78_796_800, 11),    // 1972-07-01
    (94_694_400, 12),    // 1973-01-01
    (126_230_400, 13),   // 1974-01-01
    (157_766_400, 14),   // 1975-01-01
    (189_302_400, 15),   // 1976-01-01
    (220_924_800, 16),   // 1977-01-01
    (252_460_800, 17),   // 1978-01-01
    (283_996_800, 18),   // 1979-01-01
    (315_532_800, 19),   // 1980-01-01
    (362_793_600, 20),   // 1981-07-01
    (394_329_600, 21),   // 1982-07-01
    (425_865_600, 22),   // 1983-07-01
    (489_024_000, 23),   // 1985-07-01
    (567_993_600, 24),   // 1988-01-01
    (631_152_000, 25),   // 1990-01-01
    (662_688_000, 26),   // 1991-01-01
    (709_948_800, 27),   // 1992-07-01
    (741_484_800, 28),   // 1993-07-01
    (773_020_800, 29),   // 1994-07-01
    (820_454_400, 30),   // 1996-01-01
    (867_715_200, 31),   // 1997-07-01
    (915_148_800, 32),   // 1999-01-01
    (1_136_073_600, 33), // 2006-01-01
    (1_230_768_000, 34), // 2009-01-01
    (1_341_100_800, 35), // 2012-07-01
    (1_435_708_800, 36), // 2015-07-01
    (1_483_228_800, 37), // 2017-01-01
];

/// ΔAT in whole seconds in force at the given Unix second.
pub(super) fn tai_minus_utc(unix_secs: i64) -> i64 {
    let idx = LEAP_TABLE.partition_point(|&(start, _)| start <= unix_secs);
    if idx == 0 {
        LEAP_TABLE[0].1
    } else {
        LEAP_TABLE[idx - 1].1
    }
}

/// Map `unix_nanos + ΔAT` (a continuous, TAI-like count) back to UTC ticks.
///
/// Inside an inserted leap second the result is pinned to the start of the
/// following UTC second.
pub(super) fn utc_from_tai_like(tai_like: i64) -> Tick {
    let idx = LEAP_TABLE.partition_point(|&(start, offset)| {
        (start + offset).saturating_mul(NANOS_PER_SECOND) <= tai_like
    });
    let offset = if idx == 0 {
        LEAP_TABLE[0].1
    } else {
        LEAP_TABLE[idx - 1].1
    };
    let utc = tai_like.saturating_sub(offset * NANOS_PER_SECOND);

    match LEAP_TABLE.get(idx) {
        Some(&(next_start, _)) if utc >= next_start * NANOS_PER_SECOND => {
            next_start * NANOS_PER_SECOND
        }
        _ => utc,
    }
}
