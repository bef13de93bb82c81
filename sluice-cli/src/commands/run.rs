//! Run command handler
//!
//! Executes the workspace pipeline once, in the foreground, and exits with
//! the run's exit code.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::*;
use sluice_core::domain::trigger::TriggerEvent;
use sluice_runner::repository::{FileRunRepository, RunRepository};
use sluice_runner::secrets::EnvSecretStore;
use sluice_runner::service::{
    ExecutionService, RunRequest, StandardCapabilitiesService, StandardExecutionService,
};
use std::sync::Arc;

use crate::commands::runs::{print_log_entry, print_run_details};
use crate::config::Config;

/// Kind of event to simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerKind {
    Push,
    Schedule,
}

#[derive(Args)]
pub struct RunArgs {
    /// Event that starts the run
    #[arg(short, long, value_enum, default_value_t = TriggerKind::Push)]
    trigger: TriggerKind,

    /// Branch for push triggers
    #[arg(short, long, default_value = "main")]
    branch: String,

    /// Extra variables for the scripts as KEY=value pairs
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Do everything except pushing the published branch
    #[arg(long)]
    dry_run: bool,

    /// Do not print the run log
    #[arg(short, long)]
    quiet: bool,
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn trigger_event(kind: TriggerKind, branch: String) -> TriggerEvent {
    match kind {
        TriggerKind::Push => TriggerEvent::push(branch),
        TriggerKind::Schedule => TriggerEvent::schedule(chrono::Utc::now()),
    }
}

pub async fn handle_run_command(args: RunArgs, config: &Config) -> Result<i32> {
    let mut runner_config = config.runner_config()?;
    runner_config.dry_run |= args.dry_run;

    let path = runner_config.pipeline_path();
    let source = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read pipeline from {}", path.display()))?;

    let repository = Arc::new(FileRunRepository::new(&runner_config.workspace));
    let service = StandardExecutionService::new(
        runner_config,
        repository.clone(),
        Arc::new(StandardCapabilitiesService::new()),
        Arc::new(EnvSecretStore),
    );

    let trigger = trigger_event(args.trigger, args.branch);
    println!(
        "{} {} ({})",
        "▸ Running".cyan().bold(),
        path.display(),
        trigger
    );

    let mut request = RunRequest::new(source, trigger);
    request.vars = args.vars.into_iter().collect();

    let run = service.execute(request).await?;

    if !args.quiet {
        let logs = repository.read_logs(run.id).await?;
        println!("{}", "─".repeat(80).dimmed());
        for log in &logs {
            print_log_entry(log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    print_run_details(&run);

    Ok(run.result.as_ref().map(|r| r.exit_code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("SITE_URL=https://example.org/a=b").unwrap(),
            ("SITE_URL".to_string(), "https://example.org/a=b".to_string())
        );
        assert_eq!(parse_key_val("EMPTY=").unwrap().1, "");
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_trigger_event() {
        assert_eq!(
            trigger_event(TriggerKind::Push, "main".to_string()),
            TriggerEvent::push("main")
        );
        assert_eq!(
            trigger_event(TriggerKind::Schedule, "ignored".to_string()).kind(),
            "schedule"
        );
    }
}
