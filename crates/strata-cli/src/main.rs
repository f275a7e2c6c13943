//! Strata CLI - command-line interface for the control plane.
//!
//! The main entry point for the `strata` binary.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strata_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Deploy(args) => strata_cli::commands::deploy::execute(args, &config).await,
            Commands::Trigger(args) => strata_cli::commands::trigger::execute(args, &config).await,
            Commands::Replay(args) => strata_cli::commands::replay::execute(args, &config).await,
            Commands::Trace(args) => strata_cli::commands::trace::execute(args, &config).await,
            Commands::Status(args) => strata_cli::commands::status::execute(args, &config).await,
            Commands::List(args) => strata_cli::commands::list::execute(args, &config).await,
        }
    })
}
