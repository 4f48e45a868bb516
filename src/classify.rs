//! Status filtering and release labeling
//!
//! Sits between the access-log parser and the counter: rejects responses we
//! are not interested in, then attaches the release label extracted from the
//! request path. Both stages are lazy iterator adapters, nothing is
//! materialized.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::debug;

use crate::accesslog::Request;

/// Name of the capture group a release pattern must define
pub const RELEASE_GROUP: &str = "release";

/// A [`Request`] reduced to what the counter needs, with its release label
/// attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub address: String,
    pub timestamp: DateTime<FixedOffset>,
    pub release: String,
}

/// Keep only requests with status in `200..400`
///
/// Client and server errors are excluded: clients probe arbitrary
/// nonexistent paths and may invent their own release names, so only
/// successfully served (or redirected) paths count.
pub fn filter_status<I>(requests: I) -> impl Iterator<Item = Request>
where
    I: Iterator<Item = Request>,
{
    requests.filter(|request| (200..400).contains(&request.status))
}

/// Attach release labels extracted from request paths
///
/// The pattern is searched (not anchored) against the decoded path and must
/// define a `release` named capture group; validated patterns come from the
/// config layer. Requests that do not match carry no release we track and
/// are dropped.
pub fn classify<'p, I>(requests: I, pattern: &'p Regex) -> impl Iterator<Item = Record> + 'p
where
    I: Iterator<Item = Request> + 'p,
{
    requests.filter_map(move |request| {
        let Some(captures) = pattern.captures(&request.path) else {
            debug!(path = %request.path, "dropping, no valid release");
            return None;
        };
        let release = captures
            .name(RELEASE_GROUP)
            .map(|m| m.as_str().to_string())?;
        Some(Record {
            address: request.address,
            timestamp: request.timestamp,
            release,
        })
    })
}

/// Check that a pattern is usable for classification
///
/// Used by config validation so a missing `release` group is caught at
/// startup, not silently as zero matches.
pub fn has_release_group(pattern: &Regex) -> bool {
    pattern
        .capture_names()
        .any(|name| name == Some(RELEASE_GROUP))
}
