//! Sluice CLI
//!
//! Command-line interface for running the site pipeline locally, inspecting
//! recorded runs and driving the data-generation helpers.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice pipeline runner CLI", long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, env = "SLUICE_WORKSPACE", default_value = ".", global = true)]
    workspace: PathBuf,

    /// Pipeline definition, relative to the workspace
    #[arg(short, long, env = "SLUICE_PIPELINE", default_value = "pipeline.lua", global = true)]
    pipeline: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=info,sluice_runner=info,sluice_iati=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        workspace: cli.workspace,
        pipeline: cli.pipeline,
    };

    let code = handle_command(cli.command, &config).await?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
