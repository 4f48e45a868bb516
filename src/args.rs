//! Command-line argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::month::Month;
use crate::runner::RunOptions;

/// Estimate monthly unique mirror clients from access logs
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Process this specific month
    #[arg(long, value_name = "YYYY-MM", conflicts_with_all = ["this_month", "last_month"])]
    pub month: Option<Month>,

    /// Process the current month (also selects --force-fetch)
    #[arg(long, conflicts_with = "last_month")]
    pub this_month: bool,

    /// Process last month
    #[arg(long)]
    pub last_month: bool,

    /// Force fetching the exit node list even when a cache exists
    #[arg(long, overrides_with = "no_force_fetch")]
    pub force_fetch: bool,

    /// Never force-fetch, even for the current month
    #[arg(long, overrides_with = "force_fetch")]
    pub no_force_fetch: bool,

    /// Location of the data file results are merged into
    #[arg(long, value_name = "FILE", default_value = "mirror-census.json", env)]
    pub datafile: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "mirror-census.toml", env)]
    pub config: PathBuf,

    /// Build the exit index from local exit-list files, archives, or
    /// directories instead of fetching from CollecTor
    #[arg(long = "exit-list", value_name = "PATH")]
    pub exit_lists: Vec<PathBuf>,

    /// Force descriptor type for exit lists without a @type annotation
    /// (workaround for old archives, tor#21195)
    #[arg(long, value_name = "TYPE")]
    pub force_descriptor_type: Option<String>,

    /// Omit the last-updated stamp from the datafile meta block
    #[arg(long, hide = true)]
    pub no_last_updated: bool,

    /// Log files overriding the configured file sets
    #[arg(value_name = "LOGFILE")]
    pub logfiles: Vec<PathBuf>,
}

impl Args {
    /// Resolve the argument surface into concrete run options
    ///
    /// Month selection: `--month` wins, then `--this-month` / `--last-month`,
    /// then the current month. The current month always implies a forced
    /// fetch (its archive grows daily, a cache would go stale within hours)
    /// unless `--no-force-fetch` pins it down.
    #[must_use]
    pub fn resolve(&self) -> RunOptions {
        let (month, current_selected) = match self.month {
            Some(month) => (month, false),
            None if self.last_month => (Month::current().previous(), false),
            None => (Month::current(), true),
        };

        let force_fetch = if self.no_force_fetch {
            false
        } else {
            self.force_fetch || current_selected || self.this_month
        };

        RunOptions {
            month,
            force_fetch,
            datafile: self.datafile.clone(),
            logfiles: self.logfiles.clone(),
            exit_lists: self.exit_lists.clone(),
            force_descriptor_type: self.force_descriptor_type.clone(),
            record_last_updated: !self.no_last_updated,
        }
    }
}
