#![deny(unsafe_code)]

mod cli;
mod commands;

use clap::Parser;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Wide(args) => commands::run_wide(&args),
        Command::Hourly(args) => commands::run_hourly(&args),
        Command::ConvertUnits(args) => commands::run_convert_units(&args),
        Command::Validate(args) => commands::run_validate(&args),
    }
}
