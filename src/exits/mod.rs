//! Exit relay interval index
//!
//! Answers "was this address operating as a Tor exit relay at this moment?"
//! for every request in a counting run. Built from exit-list descriptor
//! observations, compacted once, then queried read-only for the rest of the
//! run.
//!
//! # Build protocol
//!
//! 1. [`ExitIntervalIndex::register`] once per (address, descriptor)
//!    observation while loading a descriptor batch.
//! 2. [`ExitIntervalIndex::compact`] exactly once after the batch is loaded.
//! 3. [`ExitIntervalIndex::query`] for the remainder of the run.
//!
//! Queries issued before compaction still return correct answers (a linear
//! scan is used as fallback), but the O(log n) path requires the sorted,
//! merged representation that compaction establishes.

mod cache;
mod descriptor;
mod fetch;

pub use cache::{load_cache, store_cache};
pub use descriptor::{
    bake_descriptors, parse_exit_list, DescriptorError, DescriptorReader, ExitDescriptor,
};
pub use fetch::{fetch_exit_list_archive, load_exit_list_paths, EXIT_LIST_URI};

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Default slack added around each observed interval, in hours
///
/// Exit lists are published with some lag relative to when a relay actually
/// starts or stops exiting, so an address is treated as an exit for a margin
/// on both sides of its observed lifetime.
pub const DEFAULT_TOLERANCE_HOURS: i64 = 24;

/// One continuous period during which an address was observed as an exit
///
/// `start` is the descriptor publication time, `end` the last time the relay
/// was seen in a network status. Multiple observations for the same address
/// accumulate and are merged by [`ExitIntervalIndex::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExitInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExitInterval {
    /// Whether `t` falls within this interval widened by `tolerance` on both
    /// sides
    #[inline]
    fn covers(&self, t: DateTime<Utc>, tolerance: Duration) -> bool {
        self.start - tolerance <= t && t <= self.end + tolerance
    }
}

/// Per-address map of exit observation windows
///
/// The only large long-lived structure in a run. Shared read-only by the
/// counter after compaction; persistable to a cache file keyed by month (see
/// [`store_cache`] / [`load_cache`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitIntervalIndex {
    /// Tolerance in whole hours; kept as an integer so the cache encoding is
    /// stable
    tolerance_hours: i64,
    intervals: HashMap<String, Vec<ExitInterval>>,
    compacted: bool,
}

impl Default for ExitIntervalIndex {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_HOURS)
    }
}

impl ExitIntervalIndex {
    /// Create an empty index with the given tolerance in hours
    #[must_use]
    pub fn new(tolerance_hours: i64) -> Self {
        Self {
            tolerance_hours,
            intervals: HashMap::new(),
            compacted: false,
        }
    }

    /// Tolerance applied on both sides of every interval
    #[must_use]
    pub fn tolerance(&self) -> Duration {
        Duration::hours(self.tolerance_hours)
    }

    /// Tolerance in whole hours, as configured
    #[must_use]
    pub const fn tolerance_hours(&self) -> i64 {
        self.tolerance_hours
    }

    /// Number of addresses with at least one registered interval
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether no address has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Record one (address, descriptor) observation
    ///
    /// `start` and `end` come straight from the descriptor source; nothing
    /// beyond `start <= end` is assumed and malformed descriptors are the
    /// source's concern. Registering invalidates any prior compaction.
    pub fn register(&mut self, address: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        debug_assert!(start <= end, "descriptor interval must not be inverted");
        self.intervals
            .entry(address.to_string())
            .or_default()
            .push(ExitInterval { start, end });
        self.compacted = false;
    }

    /// Sort and merge each address's intervals
    ///
    /// Two consecutive intervals are merged when the gap between them is
    /// within the tolerance: any timestamp in such a gap is already covered
    /// by query-time widening, so the merged form is observationally
    /// equivalent and strictly smaller. Idempotent.
    pub fn compact(&mut self) {
        let tolerance = self.tolerance();
        for intervals in self.intervals.values_mut() {
            intervals.sort_unstable();
            let mut merged: Vec<ExitInterval> = Vec::with_capacity(intervals.len());
            for interval in intervals.drain(..) {
                match merged.last_mut() {
                    Some(last) if last.end >= interval.start - tolerance => {
                        last.end = last.end.max(interval.end);
                    }
                    _ => merged.push(interval),
                }
            }
            *intervals = merged;
        }
        self.compacted = true;
    }

    /// Whether `address` was plausibly an exit relay at `timestamp`
    ///
    /// True iff some registered interval, widened by the tolerance on both
    /// sides, contains the timestamp. Unknown addresses answer false.
    #[must_use]
    pub fn query(&self, address: &str, timestamp: &DateTime<FixedOffset>) -> bool {
        let Some(intervals) = self.intervals.get(address) else {
            return false;
        };
        let t = timestamp.with_timezone(&Utc);
        let tolerance = self.tolerance();

        if !self.compacted {
            return intervals.iter().any(|iv| iv.covers(t, tolerance));
        }

        // After compaction the intervals are sorted, non-overlapping, and
        // their ends increase, so of all intervals whose widened start
        // precedes t only the last can still cover it.
        let upper = intervals.partition_point(|iv| iv.start - tolerance <= t);
        match intervals[..upper].last() {
            Some(interval) => interval.end + tolerance >= t,
            None => false,
        }
    }

    /// Registered intervals for one address, mainly for diagnostics and tests
    #[must_use]
    pub fn intervals_for(&self, address: &str) -> Option<&[ExitInterval]> {
        self.intervals.get(address).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn query_at(index: &ExitIntervalIndex, address: &str, t: DateTime<Utc>) -> bool {
        index.query(address, &t.fixed_offset())
    }

    #[test]
    fn test_unknown_address_is_never_exit() {
        let index = ExitIntervalIndex::default();
        assert!(!query_at(&index, "192.0.2.1", utc(2022, 7, 1, 0, 0)));
    }

    #[test]
    fn test_query_widened_by_tolerance_on_both_sides() {
        let mut index = ExitIntervalIndex::new(24);
        index.register("192.0.2.1", utc(2022, 7, 10, 0, 0), utc(2022, 7, 10, 2, 0));
        index.compact();

        // exact bounds of the widened window
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 9, 0, 0)));
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 11, 2, 0)));
        // inside
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 10, 1, 0)));
        // immediately outside either end
        assert!(!query_at(
            &index,
            "192.0.2.1",
            utc(2022, 7, 8, 23, 59)
        ));
        assert!(!query_at(&index, "192.0.2.1", utc(2022, 7, 11, 2, 1)));
    }

    #[test]
    fn test_gap_within_tolerance_merges() {
        // (day1 00:00, day1 02:00) and (day2 01:00, day2 03:00): the 23h gap
        // is within the 24h tolerance, so one merged interval results.
        let mut index = ExitIntervalIndex::new(24);
        index.register("192.0.2.1", utc(2022, 7, 1, 0, 0), utc(2022, 7, 1, 2, 0));
        index.register("192.0.2.1", utc(2022, 7, 2, 1, 0), utc(2022, 7, 2, 3, 0));
        index.compact();

        let intervals = index.intervals_for("192.0.2.1").unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, utc(2022, 7, 1, 0, 0));
        assert_eq!(intervals[0].end, utc(2022, 7, 2, 3, 0));
    }

    #[test]
    fn test_gap_beyond_tolerance_stays_split() {
        let mut index = ExitIntervalIndex::new(24);
        index.register("192.0.2.1", utc(2022, 7, 1, 0, 0), utc(2022, 7, 1, 2, 0));
        index.register("192.0.2.1", utc(2022, 7, 5, 0, 0), utc(2022, 7, 5, 2, 0));
        index.compact();

        assert_eq!(index.intervals_for("192.0.2.1").unwrap().len(), 2);
        // the gap between the widened windows is still uncovered
        assert!(!query_at(&index, "192.0.2.1", utc(2022, 7, 3, 12, 0)));
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 4, 12, 0)));
    }

    #[test]
    fn test_compact_is_idempotent() {
        let mut index = ExitIntervalIndex::new(24);
        index.register("192.0.2.1", utc(2022, 7, 1, 0, 0), utc(2022, 7, 1, 2, 0));
        index.register("192.0.2.1", utc(2022, 7, 2, 1, 0), utc(2022, 7, 2, 3, 0));
        index.register("192.0.2.1", utc(2022, 7, 9, 0, 0), utc(2022, 7, 9, 1, 0));
        index.compact();
        let once = index.intervals_for("192.0.2.1").unwrap().to_vec();
        index.compact();
        let twice = index.intervals_for("192.0.2.1").unwrap().to_vec();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_query_agrees_before_and_after_compaction() {
        let mut index = ExitIntervalIndex::new(24);
        // overlapping and out-of-order registrations
        index.register("192.0.2.1", utc(2022, 7, 10, 0, 0), utc(2022, 7, 12, 0, 0));
        index.register("192.0.2.1", utc(2022, 7, 1, 0, 0), utc(2022, 7, 2, 0, 0));
        index.register("192.0.2.1", utc(2022, 7, 11, 0, 0), utc(2022, 7, 15, 0, 0));

        let probes = [
            utc(2022, 6, 29, 0, 0),
            utc(2022, 6, 30, 0, 0),
            utc(2022, 7, 2, 12, 0),
            utc(2022, 7, 5, 0, 0),
            utc(2022, 7, 13, 0, 0),
            utc(2022, 7, 16, 0, 0),
            utc(2022, 7, 20, 0, 0),
        ];
        let before: Vec<bool> = probes
            .iter()
            .map(|t| query_at(&index, "192.0.2.1", *t))
            .collect();
        index.compact();
        let after: Vec<bool> = probes
            .iter()
            .map(|t| query_at(&index, "192.0.2.1", *t))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_tolerance() {
        let mut index = ExitIntervalIndex::new(0);
        index.register("192.0.2.1", utc(2022, 7, 10, 0, 0), utc(2022, 7, 10, 2, 0));
        index.compact();
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 10, 0, 0)));
        assert!(query_at(&index, "192.0.2.1", utc(2022, 7, 10, 2, 0)));
        assert!(!query_at(&index, "192.0.2.1", utc(2022, 7, 9, 23, 59)));
        assert!(!query_at(&index, "192.0.2.1", utc(2022, 7, 10, 2, 1)));
    }
}
