use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use countersign_cli::Cli;
use countersign_core::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A broken config is reported by the command itself as JSON; only logging is skipped here.
    if let Err(error) = init_logging(&cli) {
        eprintln!("countersign: logging disabled: {error:#}");
    }

    countersign_cli::run(cli)
}

fn init_logging(cli: &Cli) -> Result<()> {
    let config = AppConfig::load(cli.load_options()).context("loading configuration")?;
    let filter = EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("invalid logging.level `{}`", config.logging.level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!(error))
}
