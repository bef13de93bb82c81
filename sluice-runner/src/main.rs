//! Sluice Runner
//!
//! A long-running daemon that watches a workspace's pipeline triggers and
//! executes runs locally.
//!
//! Architecture:
//! - Configuration: loaded from `SLUICE_*` environment variables or defaults
//! - Repository: run records and logs under `<workspace>/.sluice/runs`
//! - Services: execution, capability preflight, log buffering
//! - Scheduler: cron ticks and branch watching
//!
//! Runs never overlap; each one gets a fresh sandbox, context and log buffer.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sluice_runner::config::Config;
use sluice_runner::podman::check_podman_available;
use sluice_runner::repository::{FileRunRepository, RunRepository};
use sluice_runner::scheduler::TriggerPoller;
use sluice_runner::secrets::{EnvSecretStore, SecretStore};
use sluice_runner::service::{
    CapabilitiesService, ExecutionService, StandardCapabilitiesService, StandardExecutionService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sluice Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: workspace={}, pipeline={}, remote={}",
        config.workspace.display(),
        config.pipeline_file.display(),
        config.remote
    );
    if config.dry_run {
        warn!("Dry run enabled: publish steps will not push");
    }

    let capabilities: Arc<dyn CapabilitiesService> = Arc::new(StandardCapabilitiesService::new());
    let discovered = capabilities.discover();
    info!("Discovered {} capabilities", discovered.len());
    for cap in &discovered {
        info!("  - {}", cap);
    }

    if let Some(image) = &config.default_container_image {
        check_podman_available()
            .with_context(|| format!("Default container image '{}' needs podman", image))?;
    }

    let repository: Arc<dyn RunRepository> = Arc::new(FileRunRepository::new(&config.workspace));
    let secrets: Arc<dyn SecretStore> = Arc::new(EnvSecretStore);
    let execution: Arc<dyn ExecutionService> = Arc::new(StandardExecutionService::new(
        config.clone(),
        repository,
        capabilities,
        secrets,
    ));

    info!("Services initialized");
    info!(
        "Poll interval: {:?}, Log flush interval: {:?}",
        config.poll_interval, config.log_flush_interval
    );

    let poller = TriggerPoller::new(config, execution);
    if let Err(e) = poller.run().await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            Config::default()
        }
    };
    config.validate()?;
    Ok(config)
}
