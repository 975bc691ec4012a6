use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands};
use commands::{cmd_config, cmd_history, cmd_monitor, cmd_scan};
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Stdout carries command output and mirror records.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions::new(cli.no_color || config.no_color);
    let data_dir = config.resolve_data_dir(cli.data_dir.clone());

    match cli.command {
        Commands::Scan { timeout, output } => {
            let duration = Duration::from_secs(timeout.unwrap_or(config.scan_duration));
            cmd_scan(duration, output.format, cli.output.as_ref(), cli.quiet, &opts).await?;
        }
        Commands::Monitor(args) => {
            cmd_monitor(args, &config, data_dir, cli.quiet, &opts).await?;
        }
        Commands::History { action } => {
            cmd_history(data_dir, action, cli.output.as_ref(), &opts)?;
        }
        Commands::Config { action } => {
            cmd_config(action, &config)?;
        }
    }

    Ok(())
}
