//! ID resolver module
//!
//! Handles resolution of run id prefixes to full UUIDs by scanning the run
//! repository, so users can type a short unambiguous prefix.

use anyhow::{Context, Result, anyhow};
use sluice_runner::repository::RunRepository;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a run ID or prefix to a full UUID
///
/// # Errors
/// Returns an error if:
/// - No run matches the prefix
/// - Multiple runs match the prefix (ambiguous)
/// - The repository cannot be read
pub async fn resolve_run_id(repository: &dyn RunRepository, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = repository
        .list()
        .await
        .context("Failed to list runs for ID resolution")?;

    let matches: Vec<Uuid> = runs
        .iter()
        .map(|run| run.id)
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No run found with ID starting with '{}'", id_or_prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
