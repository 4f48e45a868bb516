//! Per-release traffic counting and Tor user estimation
//!
//! Direct clients are deduplicated by address. Tor clients cannot be: many
//! distinct users appear behind a small set of exit addresses, so raw relay
//! request counts say nothing about unique users. Assuming the
//! requests-per-user ratio is roughly the same on both sides, relay users
//! are estimated by scaling relay requests with the direct-traffic ratio:
//!
//! ```text
//! tor = requests_relay * |unique_plain| / requests_plain
//! ```
//!
//! Integer division, truncating. A month with no direct traffic has no ratio
//! to scale by; the estimate is defined as 0 in that case rather than a
//! division failure.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::classify::Record;
use crate::exits::ExitIntervalIndex;
use crate::month::Month;

/// Reserved label aggregating every record regardless of release
pub const ANY_LABEL: &str = "any";

/// Accumulated traffic for one release label
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    unique_plain: HashSet<String>,
    requests_plain: u64,
    requests_relay: u64,
}

impl Bucket {
    fn count_plain(&mut self, address: &str) {
        // borrowed lookup first: insert would need an owned String per call
        if !self.unique_plain.contains(address) {
            self.unique_plain.insert(address.to_string());
        }
        self.requests_plain += 1;
    }

    fn count_relay(&mut self) {
        self.requests_relay += 1;
    }

    /// Unique direct clients
    #[must_use]
    pub fn plain(&self) -> u64 {
        self.unique_plain.len() as u64
    }

    /// Direct requests counted
    #[must_use]
    pub const fn requests_plain(&self) -> u64 {
        self.requests_plain
    }

    /// Relay requests counted
    #[must_use]
    pub const fn requests_relay(&self) -> u64 {
        self.requests_relay
    }

    /// Estimated unique Tor users, normalized against direct traffic
    ///
    /// 0 when no direct traffic was seen: there is no users-per-request
    /// ratio to scale by.
    #[must_use]
    pub fn relay_estimate(&self) -> u64 {
        if self.requests_plain == 0 {
            return 0;
        }
        self.requests_relay * self.plain() / self.requests_plain
    }

    /// The externally visible shape of this bucket
    #[must_use]
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            plain: self.plain(),
            tor: self.relay_estimate(),
        }
    }
}

/// Serialized form of a bucket: `{"plain": N, "tor": M}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    pub plain: u64,
    pub tor: u64,
}

/// Classifies and accumulates records for one month
///
/// Constructed per run, fed every in-scope record, then read once. The exit
/// index is shared read-only; buckets are owned here exclusively and spring
/// into existence explicitly via the entry API on first record for a label.
#[derive(Debug)]
pub struct Counter<'a> {
    month: Month,
    index: &'a ExitIntervalIndex,
    buckets: BTreeMap<String, Bucket>,
}

impl<'a> Counter<'a> {
    /// Create a counter scoped to `month`, classifying against `index`
    ///
    /// The index must already be compacted.
    #[must_use]
    pub fn new(month: Month, index: &'a ExitIntervalIndex) -> Self {
        Self {
            month,
            index,
            buckets: BTreeMap::new(),
        }
    }

    /// Month this counter is scoped to
    #[must_use]
    pub fn month(&self) -> Month {
        self.month
    }

    /// Count one record into its release bucket and the `"any"` bucket
    ///
    /// Records outside the scoped month (log head/tail spillover) are
    /// dropped without touching any bucket.
    pub fn count(&mut self, record: &Record) {
        if !self.month.contains(&record.timestamp) {
            debug!(timestamp = %record.timestamp, "dropping, out of scope");
            return;
        }

        let is_relay = self.index.query(&record.address, &record.timestamp);
        trace!(
            address = %record.address,
            release = %record.release,
            is_relay,
            "counting record"
        );

        for label in [record.release.as_str(), ANY_LABEL] {
            let bucket = self.buckets.entry(label.to_string()).or_default();
            if is_relay {
                bucket.count_relay();
            } else {
                bucket.count_plain(&record.address);
            }
        }
    }

    /// Per-label results in label order
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, BucketStats> {
        self.buckets
            .iter()
            .map(|(label, bucket)| (label.clone(), bucket.stats()))
            .collect()
    }

    /// Access one bucket, if any record carried its label
    #[must_use]
    pub fn bucket(&self, label: &str) -> Option<&Bucket> {
        self.buckets.get(label)
    }
}
