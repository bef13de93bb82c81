//! Runs command handlers
//!
//! Lists recorded runs and shows their details and logs.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::run::{Run, RunStatus, StageStatus};
use sluice_core::dto::run::RunSummary;
use sluice_runner::repository::{FileRunRepository, RunRepository};

use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Runs subcommands
#[derive(Subcommand)]
pub enum RunsCommands {
    /// List recorded runs, newest first
    List {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show run details
    Show {
        /// Run ID or unambiguous prefix
        id: IdOrPrefix,

        /// Also print the run log
        #[arg(long)]
        logs: bool,
    },
}

pub async fn handle_runs_command(command: RunsCommands, config: &Config) -> Result<i32> {
    let repository = FileRunRepository::new(&config.workspace);

    match command {
        RunsCommands::List { limit } => list_runs(&repository, limit).await?,
        RunsCommands::Show { id, logs } => show_run(&repository, &id, logs).await?,
    }

    Ok(0)
}

async fn list_runs(repository: &FileRunRepository, limit: usize) -> Result<()> {
    let runs = repository.list().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Showing {} of {} run(s):", runs.len().min(limit), runs.len()).bold()
    );
    println!();
    for run in runs.iter().take(limit) {
        print_run_summary(&RunSummary::from(run));
    }

    Ok(())
}

async fn show_run(repository: &FileRunRepository, id: &IdOrPrefix, logs: bool) -> Result<()> {
    let uuid = resolve_run_id(repository, id).await?;
    let run = repository.get(uuid).await?;

    print_run_details(&run);

    if logs {
        let entries = repository.read_logs(uuid).await?;
        println!();
        if entries.is_empty() {
            println!("{}", "No logs found for this run.".yellow());
        } else {
            println!("{}", format!("Logs for run {}:", uuid).bold());
            println!("{}", "─".repeat(80).dimmed());
            for entry in &entries {
                print_log_entry(entry);
            }
            println!("{}", "─".repeat(80).dimmed());
        }
    }

    Ok(())
}

fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Pipeline: {}", run.pipeline);
    println!("    Trigger:  {}", run.trigger.dimmed());
    println!("    Status:   {}", colorize_status(run.status));
    println!(
        "    Created:  {}",
        run.requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let (Some(stage), Some(kind)) = (&run.failed_stage, run.failure) {
        println!("    Failed:   {} ({})", stage.red(), kind);
    }
    println!();
}

/// Print detailed run information
pub(crate) fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Pipeline:  {}", run.pipeline);
    println!("  Trigger:   {}", run.trigger);
    println!("  Status:    {}", colorize_status(run.status));
    println!("  Requested: {}", run.requested_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(started) = run.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
        if let Some(started) = run.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:  {}s", duration.num_seconds());
        }
    }

    println!("\n{}", "Stages:".bold());
    for stage in &run.stages {
        let marker = match stage.status {
            StageStatus::Succeeded => "✓".green(),
            StageStatus::Failed => "✗".red(),
            StageStatus::Skipped => "-".dimmed(),
            StageStatus::Running => "…".cyan(),
            StageStatus::Pending => "·".dimmed(),
        };
        println!("  {} {}", marker, stage.name);
    }

    if let Some(result) = &run.result {
        println!("\n{}", "Result:".bold());
        println!(
            "  Success:   {}",
            if result.success {
                "✓".green()
            } else {
                "✗".red()
            }
        );
        println!("  Exit Code: {}", result.exit_code);

        if let Some(published) = &result.published {
            let commit = published.commit.as_deref().unwrap_or("dry run");
            println!(
                "  Published: {} → {} {} ({})",
                published.source_dir,
                published.remote,
                published.branch.cyan(),
                commit.dimmed()
            );
        }

        if let Some(error) = &result.error_message {
            println!("\n{}", "Error:".bold());
            if let Some(stage) = &result.failed_stage {
                println!("  Stage: {}", stage);
            }
            if let Some(kind) = result.failure {
                println!("  Kind:  {}", kind);
            }
            println!("{}", error.red());
        }
    }
}

/// Print a log entry
pub(crate) fn print_log_entry(log: &LogEntry) {
    let level = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level.dimmed(),
        LogLevel::Info => level.cyan(),
        LogLevel::Warning => level.yellow(),
        LogLevel::Error => level.red(),
    };

    let stage = log
        .stage
        .as_deref()
        .map(|stage| format!("{} ", stage.dimmed()))
        .unwrap_or_default();

    println!(
        "{} [{}] {}{}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        stage,
        log.message
    );
}

/// Colorize run status for display
fn colorize_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Pending => text.yellow(),
        RunStatus::Running => text.cyan(),
        RunStatus::Succeeded => text.green(),
        RunStatus::Failed => text.red(),
    }
}
