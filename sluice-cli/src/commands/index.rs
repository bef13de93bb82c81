//! Index command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_iati::build_location_index;
use sluice_iati::index::{load_activities, to_json};
use std::path::PathBuf;

/// Index subcommands
#[derive(Subcommand)]
pub enum IndexCommands {
    /// Index activities by the locations they mention
    Locations {
        /// Activities JSON file
        activities: PathBuf,

        /// Write the index here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn handle_index_command(command: IndexCommands) -> Result<i32> {
    match command {
        IndexCommands::Locations { activities, output } => {
            let loaded = load_activities(&activities)?;
            let json = to_json(&build_location_index(&loaded))?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, format!("{}\n", json))
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "{} {} activities into {}",
                        "✓ Indexed".green(),
                        loaded.len(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(0)
}
