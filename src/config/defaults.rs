//! Default values for configuration fields
//!
//! Centralizes the default value functions used in serde deserialization.

use std::path::PathBuf;

use super::types::{LogFormat, ParserConfig};
use crate::exits::DEFAULT_TOLERANCE_HOURS;

/// Default directory for per-month exit cache files
#[inline]
pub fn cache_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Default exit interval tolerance (24 hours)
#[inline]
pub fn tolerance_hours() -> i64 {
    DEFAULT_TOLERANCE_HOURS
}

/// Default parser set: the standard rotated nginx logs with a yum/dnf
/// repository metadata pattern
#[inline]
pub fn parsers() -> Vec<ParserConfig> {
    vec![ParserConfig {
        format: LogFormat::Combined,
        files: vec![
            PathBuf::from("/var/log/nginx/access.log"),
            PathBuf::from("/var/log/nginx/access.log.1"),
            PathBuf::from("/var/log/nginx/access.log.2"),
        ],
        regexp_path: r"^/(?P<release>[^~/]+)/(.*/)?repomd\.xml(\.metalink)?$".to_string(),
    }]
}
