//! Lookup command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_iati::{LocationLookup, OrgLookup};
use std::path::PathBuf;

/// Lookup subcommands
#[derive(Subcommand)]
pub enum LookupCommands {
    /// Look an organisation up by name or synonym
    Org {
        name: String,

        /// Organisation map
        #[arg(long, default_value = "inputs/org-map.json")]
        map: PathBuf,
    },
    /// Look a location up by name or synonym
    Location {
        name: String,

        /// Location map
        #[arg(long, default_value = "inputs/location-map.json")]
        map: PathBuf,

        /// Level assumed for unknown locations
        #[arg(long = "type", default_value = "unclassified")]
        loctype: String,
    },
}

pub async fn handle_lookup_command(command: LookupCommands) -> Result<i32> {
    let record = match command {
        LookupCommands::Org { name, map } => OrgLookup::from_path(&map)?.lookup_org(&name),
        LookupCommands::Location { name, map, loctype } => {
            LocationLookup::from_path(&map)?.lookup_location(&name, &loctype)
        }
    };

    match record {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            eprintln!("{}", "Nothing to look up: the name is blank.".yellow());
            Ok(1)
        }
    }
}
