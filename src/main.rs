use clap::Parser;

use carbon_diff::cli::{dispatch, Cli};
use carbon_diff::config::{load_config, load_config_from};
use carbon_diff::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    init_logging(&config.log.level)?;

    dispatch(cli, &config)
}
