//! Configuration loading from TOML files

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use super::defaults;
use super::types::Config;

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating config file {}", path.display()))?;
    Ok(config)
}

/// Load configuration, falling back to built-in defaults if the file does
/// not exist
///
/// A file that exists but fails to parse or validate is still an error; only
/// absence triggers the fallback.
pub fn load_config_with_fallback(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(default_config())
    }
}

/// Built-in configuration used when no config file is present
#[must_use]
pub fn default_config() -> Config {
    Config {
        title: "Estimated mirror userbase".to_string(),
        comment: None,
        source: None,
        cache_dir: defaults::cache_dir(),
        tolerance_hours: defaults::tolerance_hours(),
        parsers: defaults::parsers(),
    }
}
