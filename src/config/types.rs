//! Configuration type definitions

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Access-log format understood by a parser definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// nginx/Apache "combined" format
    #[default]
    Combined,
    /// Reserved; rejected by validation until a parser exists
    Haproxy,
}

/// One parser definition: a format, a set of log files, and the pattern that
/// extracts the release label from request paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Log format of the files in this set
    #[serde(default)]
    pub format: LogFormat,

    /// Log files to process, in order
    pub files: Vec<PathBuf>,

    /// Pattern searched against each decoded path; must define a `release`
    /// named capture group
    pub regexp_path: String,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Title written into the datafile's meta block
    pub title: String,

    /// Free-text comment for the meta block
    #[serde(default)]
    pub comment: Option<String>,

    /// Source URL recorded in the meta block
    #[serde(default)]
    pub source: Option<String>,

    /// Directory for per-month exit cache files
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: PathBuf,

    /// Slack around exit intervals, in hours
    #[serde(default = "defaults::tolerance_hours")]
    pub tolerance_hours: i64,

    /// Parser definitions; at least one is required
    #[serde(default = "defaults::parsers")]
    pub parsers: Vec<ParserConfig>,
}
