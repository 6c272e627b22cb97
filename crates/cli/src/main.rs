mod cli;
mod commands;
mod consume;
mod fleet;
mod simulate;
mod tick_file;

use anyhow::{Context, Result};
use clap::Parser;

use powermgmt_core::config::load_dotenv;
use powermgmt_core::Config;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();

    // Consumers log progress; one-shot commands print their own output.
    let default_level = match args.command {
        Command::Consume(_) => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    match args.command {
        Command::Check(check) => {
            let calendar = fleet::holiday_calendar(&config)?;
            commands::check(&config, calendar, &check)
        }
        Command::Grid(grid) => commands::grid(&config, &grid),
        Command::Alerts(alerts) => commands::alerts(&alerts),
        Command::Simulate(sim) => simulate::simulate(config, &sim).await,
        Command::Consume(consume) => {
            config.log_summary();
            consume::consume(config, &consume).await
        }
        Command::Config => commands::show_config(&config),
    }
}
