//! Validate command handler

use anyhow::{Context, Result};
use colored::*;
use sluice_lua::parse_pipeline_metadata;
use sluice_runner::service::{CapabilitiesService, StandardCapabilitiesService};

use crate::config::Config;

/// Parses the pipeline and reports its shape and any missing tools
///
/// Exits with 1 when required tools are missing.
pub async fn handle_validate_command(config: &Config) -> Result<i32> {
    let path = config.pipeline_path();
    let source = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read pipeline from {}", path.display()))?;

    let metadata = parse_pipeline_metadata(&source)
        .with_context(|| format!("Invalid pipeline definition in {}", path.display()))?;

    println!("{}", "✓ Pipeline definition is valid".green().bold());
    println!();
    println!("  Name:     {}", metadata.name.cyan());
    if let Some(description) = &metadata.description {
        println!("  About:    {}", description);
    }
    println!("  Output:   {}/", metadata.output);

    if metadata.triggers.is_empty() {
        println!("  Triggers: {}", "none (manual runs only)".yellow());
    } else {
        for branch in &metadata.triggers.push_branches {
            println!("  Trigger:  push to {}", branch.cyan());
        }
        if let Some(schedule) = &metadata.triggers.schedule {
            println!("  Trigger:  schedule {}", schedule.expression().cyan());
        }
    }

    println!("\n{}", "Stages:".bold());
    for (idx, stage) in metadata.stages.iter().enumerate() {
        let mut notes = Vec::new();
        if let Some(image) = &stage.container {
            notes.push(format!("in {}", image));
        }
        if stage.conditional {
            notes.push("conditional".to_string());
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", ")).dimmed().to_string()
        };
        println!("  {}. {}{}", idx + 1, stage.name, notes);
    }

    if metadata.requires.is_empty() {
        return Ok(0);
    }

    let missing = StandardCapabilitiesService::new().missing(&metadata.requires);
    println!("\n{}", "Required tools:".bold());
    for tool in &metadata.requires {
        if missing.contains(tool) {
            println!("  {} {}", "✗".red(), tool);
        } else {
            println!("  {} {}", "✓".green(), tool);
        }
    }

    if missing.is_empty() {
        Ok(0)
    } else {
        println!(
            "\n{}",
            format!("Missing tools: {}", missing.join(", ")).yellow()
        );
        Ok(1)
    }
}
