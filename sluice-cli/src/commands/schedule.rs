//! Schedule command handler
//!
//! Runs the trigger poller in the foreground until interrupted.

use anyhow::Result;
use colored::*;
use sluice_runner::repository::FileRunRepository;
use sluice_runner::scheduler::TriggerPoller;
use sluice_runner::secrets::EnvSecretStore;
use sluice_runner::service::{StandardCapabilitiesService, StandardExecutionService};
use std::sync::Arc;

use crate::config::Config;

pub async fn handle_schedule_command(config: &Config, dry_run: bool) -> Result<i32> {
    let mut runner_config = config.runner_config()?;
    runner_config.dry_run |= dry_run;

    println!(
        "{} {} (every {:?}, remote {})",
        "▸ Watching".cyan().bold(),
        runner_config.pipeline_path().display(),
        runner_config.poll_interval,
        runner_config.remote
    );
    println!("{}", "  Press Ctrl+C to stop".dimmed());

    let execution = Arc::new(StandardExecutionService::new(
        runner_config.clone(),
        Arc::new(FileRunRepository::new(&runner_config.workspace)),
        Arc::new(StandardCapabilitiesService::new()),
        Arc::new(EnvSecretStore),
    ));
    let poller = TriggerPoller::new(runner_config, execution);

    tokio::select! {
        result = poller.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "Stopped watching.".yellow());
        }
    }

    Ok(0)
}
