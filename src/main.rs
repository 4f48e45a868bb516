use anyhow::Result;
use clap::Parser;
use tracing::info;

use mirror_census::{load_config_with_fallback, logging, runner, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging();

    let config = load_config_with_fallback(&args.config)?;
    let options = args.resolve();
    info!(month = %options.month, force_fetch = options.force_fetch, "starting census run");

    runner::run(&options, &config)
}
