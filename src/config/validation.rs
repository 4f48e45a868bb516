//! Configuration validation
//!
//! Checks semantic constraints after deserialization so a bad configuration
//! fails at startup with a precise message, not mid-run with zero matches.

use anyhow::{bail, Context, Result};
use regex::Regex;

use super::types::{Config, LogFormat, ParserConfig};
use crate::classify;

impl Config {
    /// Validate configuration for correctness
    ///
    /// - at least one parser, each with at least one file
    /// - every release pattern compiles and defines a `release` group
    /// - only implemented log formats
    /// - positive tolerance
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("configuration must set a non-empty title");
        }
        if self.tolerance_hours < 0 {
            bail!(
                "tolerance_hours must be non-negative, got {}",
                self.tolerance_hours
            );
        }
        if self.parsers.is_empty() {
            bail!("configuration must define at least one [[parsers]] entry");
        }
        for (idx, parser) in self.parsers.iter().enumerate() {
            validate_parser(parser).with_context(|| format!("in [[parsers]] entry {idx}"))?;
        }
        Ok(())
    }

    /// Compile every parser's release pattern
    ///
    /// Only valid after [`Config::validate`]; patterns are re-compiled here
    /// rather than stored so the config stays plain serializable data.
    pub fn compiled_patterns(&self) -> Result<Vec<Regex>> {
        self.parsers
            .iter()
            .map(|parser| {
                Regex::new(&parser.regexp_path)
                    .with_context(|| format!("compiling pattern '{}'", parser.regexp_path))
            })
            .collect()
    }
}

fn validate_parser(parser: &ParserConfig) -> Result<()> {
    match parser.format {
        LogFormat::Combined => {}
        LogFormat::Haproxy => bail!("haproxy log format is not implemented"),
    }
    if parser.files.is_empty() {
        bail!("parser must list at least one log file");
    }
    let pattern = Regex::new(&parser.regexp_path)
        .with_context(|| format!("invalid regexp_path '{}'", parser.regexp_path))?;
    if !classify::has_release_group(&pattern) {
        bail!(
            "regexp_path '{}' has no (?P<release>...) capture group",
            parser.regexp_path
        );
    }
    Ok(())
}
