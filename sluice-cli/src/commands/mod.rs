//! Commands module
//!
//! Defines all CLI commands and their handlers. Handlers return the process
//! exit code.

mod index;
mod init;
mod lookup;
mod run;
mod runs;
mod schedule;
mod validate;

pub use index::IndexCommands;
pub use init::InitCommands;
pub use lookup::LookupCommands;
pub use run::RunArgs;
pub use runs::RunsCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline once for a trigger
    Run(RunArgs),
    /// Check the pipeline definition and the tools it requires
    Validate,
    /// Generate starter files
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
    /// Watch the pipeline's triggers and run it when they fire
    Schedule {
        /// Do everything except pushing the published branch
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect recorded runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Build data indexes
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
    /// Look names up in the organisation and location maps
    Lookup {
        #[command(subcommand)]
        command: LookupCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Run(args) => run::handle_run_command(args, config).await,
        Commands::Validate => validate::handle_validate_command(config).await,
        Commands::Init { command } => init::handle_init_command(command, config).await,
        Commands::Schedule { dry_run } => schedule::handle_schedule_command(config, dry_run).await,
        Commands::Runs { command } => runs::handle_runs_command(command, config).await,
        Commands::Index { command } => index::handle_index_command(command).await,
        Commands::Lookup { command } => lookup::handle_lookup_command(command).await,
    }
}
