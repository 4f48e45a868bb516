//! Configuration module
//!
//! Handles the TOML configuration surface of the census run: report
//! metadata, parser definitions (log format, file set, release pattern), and
//! cache/tolerance tuning.

mod defaults;
mod loading;
mod types;
mod validation;

pub use loading::{default_config, load_config, load_config_with_fallback};
pub use types::{Config, LogFormat, ParserConfig};

pub use defaults::{cache_dir, parsers, tolerance_hours};
