//! Export client - streams exported tables from the engine into files
//!
//! # Usage
//!
//! ```bash
//! # Connect and export (default)
//! export-client
//! export-client --config export-client.toml
//!
//! # Apply retention to an output directory
//! export-client prune --path /var/export --retention 7d
//! export-client prune --path /var/export --max-files 24 --table ORDERS
//! ```

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use export_config::{LogConfig, LogFormat, LogLevel};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Export client - streams exported tables from the engine into files
#[derive(Parser, Debug)]
#[command(name = "export-client")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the engine and export (default)
    Run,

    /// Delete finished output units by age or count
    Prune(cmd::prune::PruneArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Prune(args)) => {
            init_logging(&LogConfig::default(), cli.log_level)?;
            cmd::prune::run(args)
        }
        Some(Command::Run) | None => {
            let config = cmd::load_config(cli.config.as_deref())?;
            init_logging(&config.log, cli.log_level)?;
            cmd::run::run(config).await
        }
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over the config file and `--log-level`.
fn init_logging(log: &LogConfig, level_override: Option<LogLevel>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log.directive(level_override)))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let (console, json) = match log.format {
        LogFormat::Console => (
            Some(fmt::layer().with_target(true).with_thread_ids(false)),
            None,
        ),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(json)
        .init();

    Ok(())
}
