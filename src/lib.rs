//! Monthly unique-client estimates for update mirrors
//!
//! Counts how many distinct clients hit a distribution's update mirrors each
//! month, from web-server access logs. Traffic from Tor exit relays is
//! handled separately: many distinct users share a small set of exit
//! addresses, so those requests cannot be deduplicated by address and are
//! instead normalized against the direct-traffic requests-per-user ratio.
//!
//! # Pipeline
//!
//! ```text
//! log lines ─▶ accesslog::parse_combined ─▶ classify::filter_status
//!          ─▶ classify::classify ─▶ counter::Counter::count
//!                                      │
//!            exits::ExitIntervalIndex ◀┘ (was this address an exit then?)
//! ```
//!
//! The exit index is built once per run from TorDNSEL exit lists (fetched
//! from CollecTor or loaded from a per-month cache), compacted, then shared
//! read-only. Everything downstream is a lazy single pass; memory stays
//! bounded by the number of distinct addresses, not log lines.

pub mod accesslog;
pub mod args;
pub mod classify;
pub mod config;
pub mod counter;
pub mod exits;
pub mod logging;
pub mod month;
pub mod report;
pub mod runner;

pub use accesslog::{parse_combined, parse_line, LineError, Request};
pub use args::Args;
pub use classify::{classify, filter_status, Record};
pub use config::{load_config, load_config_with_fallback, Config};
pub use counter::{Bucket, BucketStats, Counter, ANY_LABEL};
pub use exits::{ExitInterval, ExitIntervalIndex};
pub use month::Month;
pub use report::{update_datafile, Meta};
pub use runner::{run, RunOptions};
