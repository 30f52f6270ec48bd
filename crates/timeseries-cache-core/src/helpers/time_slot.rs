//! Helpers for mapping tick ranges onto the file slots backends use.
//!
//! Instrument archives are partitioned by calendar day, or by a fixed number
//! of hours within a day. The mapping is stable and documented:
//!
//! - Slots are contiguous, non-overlapping half-open intervals aligned to
//!   UTC midnight: `[i * len, (i + 1) * len)` where `len` is one day or
//!   `block_hours` hours.
//! - `slot_index` is monotonic in time and uses Euclidean division, so
//!   pre-epoch ticks map to negative indices instead of being clamped.
//! - [`slots_for_range`] works on half-open ranges and returns every slot
//!   intersecting `[start, end)`, in ascending order.

use chrono::{NaiveDate, Timelike};

use crate::time::{NANOS_PER_DAY, NANOS_PER_HOUR, Tick, TimeRange, datetime_from_tick};

/// One file slot: a calendar day, or one block of hours within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    /// UTC calendar date the slot falls on.
    pub date: NaiveDate,
    /// UTC hour the slot starts at (0 for daily slots).
    pub hour: u32,
    /// Index of the block within the day (0 for daily slots).
    pub block: u32,
    /// Ticks covered by the slot.
    pub range: TimeRange,
}

/// Slot length in ticks for the given partitioning.
///
/// `block_hours` must divide 24; descriptors are validated for this when
/// they are loaded.
pub fn slot_len(block_hours: Option<u32>) -> i64 {
    match block_hours {
        Some(hours) => i64::from(hours) * NANOS_PER_HOUR,
        None => NANOS_PER_DAY,
    }
}

/// Map a tick to the index of the slot containing it.
pub fn slot_index(tick: Tick, block_hours: Option<u32>) -> i64 {
    tick.div_euclid(slot_len(block_hours))
}

fn slot_at(index: i64, len: i64, block_hours: Option<u32>) -> TimeSlot {
    let start = index.saturating_mul(len);
    let end = start.saturating_add(len);
    let dt = datetime_from_tick(start);
    let hour = dt.hour();
    TimeSlot {
        date: dt.date_naive(),
        hour,
        block: block_hours.map_or(0, |h| hour / h.max(1)),
        range: TimeRange::spanning(start, end),
    }
}

/// Every slot intersecting `range`, ascending. Empty for an empty range.
///
/// Example (daily slots):
///
/// - `start = 2020-01-01T12:00`, `end = 2020-01-03T00:00`
/// - Slots for 2020-01-01 and 2020-01-02 are returned.
/// - The slot for 2020-01-03 is *not* returned.
pub fn slots_for_range(range: TimeRange, block_hours: Option<u32>) -> Vec<TimeSlot> {
    if range.is_empty() {
        return Vec::new();
    }

    let len = slot_len(block_hours);
    let first = slot_index(range.start(), block_hours);
    // Shift the exclusive end back by one tick so a range ending exactly on
    // a boundary does not pull in the next slot.
    let last = slot_index(range.end() - 1, block_hours);

    (first..=last)
        .map(|index| slot_at(index, len, block_hours))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::parse(start, end).unwrap()
    }

    #[test]
    fn daily_slots_cover_partial_days() {
        let slots = slots_for_range(range("2020-01-01T12:00", "2020-01-03T00:00"), None);
        let dates: Vec<_> = slots.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, ["2020-01-01", "2020-01-02"]);
        assert_eq!(slots[0].range, range("2020-01-01", "2020-01-02"));
        assert!(slots.iter().all(|s| s.hour == 0 && s.block == 0));
    }

    #[test]
    fn range_inside_one_day_yields_one_slot() {
        let slots = slots_for_range(range("2020-01-01T10:00", "2020-01-01T10:00:01"), None);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn empty_range_yields_no_slots() {
        assert!(slots_for_range(range("2020-01-01", "2020-01-01"), None).is_empty());
    }

    #[test]
    fn hour_blocks_align_to_midnight() {
        let slots = slots_for_range(range("2020-01-01T10:30", "2020-01-01T13:00"), Some(1));
        let hours: Vec<_> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, [10, 11, 12]);

        let slots = slots_for_range(range("2020-01-01T22:00", "2020-01-02T07:00"), Some(6));
        let labels: Vec<_> = slots
            .iter()
            .map(|s| (s.date.to_string(), s.hour, s.block))
            .collect();
        assert_eq!(
            labels,
            [
                ("2020-01-01".to_string(), 18, 3),
                ("2020-01-02".to_string(), 0, 0),
                ("2020-01-02".to_string(), 6, 1),
            ]
        );
    }

    #[test]
    fn pre_epoch_slots_are_not_clamped() {
        let slots = slots_for_range(range("1969-12-31T12:00", "1970-01-01T12:00"), None);
        let dates: Vec<_> = slots.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, ["1969-12-31", "1970-01-01"]);
        assert_eq!(slot_index(-1, None), -1);
    }
}
