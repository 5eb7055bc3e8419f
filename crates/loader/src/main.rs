//! kaijs-loader - CI event loader
//!
//! Drains the broker listener's file queue into the artifact store.
//!
//! # Usage
//!
//! ```bash
//! # Run the consumer loop (default)
//! kaijs-loader
//! kaijs-loader --config /etc/kaijs/loader.toml
//!
//! # Inspect the file queue without consuming it
//! kaijs-loader queue --config /etc/kaijs/loader.toml
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// CI event loader
#[derive(Parser, Debug)]
#[command(name = "kaijs-loader")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the consumer loop
    Run(cmd::run::RunArgs),

    /// Show file queue statistics
    Queue(cmd::queue::QueueArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Command::Run(args)) => cmd::run::run(args).await,
        Some(Command::Queue(args)) => cmd::queue::run(args).await,
        // No subcommand = run the consumer loop with defaults
        None => cmd::run::run(cmd::run::RunArgs::default()).await,
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
