//! Trigger poller
//!
//! Re-reads the pipeline definition on every cycle, checks whether a cron
//! tick has passed or a watched branch moved, and runs the pipeline for
//! each event. Runs never overlap.

use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use sluice_core::domain::trigger::{TriggerConfig, TriggerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::process::run_host;
use crate::service::{ExecutionService, RunRequest};

/// What the poller remembers between cycles
#[derive(Debug, Clone)]
pub struct SchedulerState {
    last_check: DateTime<Utc>,
    last_seen: HashMap<String, String>,
}

impl SchedulerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_check: now,
            last_seen: HashMap::new(),
        }
    }

    /// Last known head of a watched branch
    pub fn last_seen(&self, branch: &str) -> Option<&str> {
        self.last_seen.get(branch).map(String::as_str)
    }

    /// Computes the events that became due since the previous call
    ///
    /// Missed cron ticks are coalesced into one event for the latest tick.
    /// The first head observed for a branch is only remembered; a run fires
    /// when a later observation differs from it.
    pub fn due_events(
        &mut self,
        triggers: &TriggerConfig,
        now: DateTime<Utc>,
        heads: &HashMap<String, String>,
    ) -> Vec<TriggerEvent> {
        let mut events = Vec::new();

        if let Some(schedule) = &triggers.schedule {
            let mut latest = None;
            let mut cursor = self.last_check;
            while let Some(tick) = schedule.next_after(cursor) {
                if tick > now {
                    break;
                }
                latest = Some(tick);
                cursor = tick;
            }
            if let Some(tick) = latest {
                events.push(TriggerEvent::schedule(tick));
            }
        }
        self.last_check = now;

        for branch in &triggers.push_branches {
            let Some(head) = heads.get(branch) else {
                continue;
            };
            match self.last_seen.insert(branch.clone(), head.clone()) {
                Some(previous) if previous != *head => {
                    events.push(TriggerEvent::push(branch.clone()));
                }
                Some(_) => {}
                None => debug!("Watching branch {} at {}", branch, head),
            }
        }

        events
    }
}

/// Extracts the sha of `refs/heads/<branch>` from `git ls-remote` output
pub fn parse_ls_remote(output: &str, branch: &str) -> Option<String> {
    let wanted = format!("refs/heads/{}", branch);
    output.lines().find_map(|line| {
        let (sha, reference) = line.split_once('\t')?;
        (reference.trim() == wanted).then(|| sha.trim().to_string())
    })
}

/// Poller that turns cron ticks and branch updates into runs
pub struct TriggerPoller {
    config: Config,
    execution: Arc<dyn ExecutionService>,
    semaphore: Arc<Semaphore>,
}

impl TriggerPoller {
    pub fn new(config: Config, execution: Arc<dyn ExecutionService>) -> Self {
        Self {
            config,
            execution,
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting trigger poller for {} (interval: {:?})",
            self.config.pipeline_path().display(),
            self.config.poll_interval
        );

        let mut state = SchedulerState::new(Utc::now());
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            match self.poll_once(&mut state).await {
                Ok(0) => debug!("Nothing to run this cycle"),
                Ok(started) => info!("Started {} run(s) this cycle", started),
                Err(e) => error!("Error during poll cycle: {:#}", e),
            }
        }
    }

    /// Performs a single poll cycle and returns how many runs were queued
    pub async fn poll_once(&self, state: &mut SchedulerState) -> Result<usize> {
        let path = self.config.pipeline_path();
        let source = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let metadata = sluice_lua::parse_pipeline_metadata(&source)
            .context("Failed to parse pipeline definition")?;

        if metadata.triggers.is_empty() {
            debug!("Pipeline '{}' declares no triggers", metadata.name);
            return Ok(0);
        }

        let heads = self.branch_heads(&metadata.triggers.push_branches).await;
        let events = state.due_events(&metadata.triggers, Utc::now(), &heads);

        for event in &events {
            info!("Queueing run of '{}' for {}", metadata.name, event);
            self.spawn_run(RunRequest::new(source.clone(), event.clone()));
        }

        Ok(events.len())
    }

    /// Looks up the current head of every watched branch on the remote
    async fn branch_heads(&self, branches: &[String]) -> HashMap<String, String> {
        let mut heads = HashMap::new();

        for branch in branches {
            match self.remote_head(branch).await {
                Ok(Some(sha)) => {
                    heads.insert(branch.clone(), sha);
                }
                Ok(None) => debug!("Branch {} not found on {}", branch, self.config.remote),
                Err(e) => warn!("Failed to query {} for {}: {:#}", self.config.remote, branch, e),
            }
        }

        heads
    }

    async fn remote_head(&self, branch: &str) -> Result<Option<String>> {
        let args = vec![
            "ls-remote".to_string(),
            self.config.remote.clone(),
            format!("refs/heads/{}", branch),
        ];
        let workspace = self.config.workspace.clone();
        let env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

        let output = tokio::task::spawn_blocking(move || run_host("git", &args, &workspace, &env))
            .await
            .context("ls-remote task panicked")??;

        if !output.success() {
            anyhow::bail!("git ls-remote failed: {}", output.stderr.trim());
        }

        Ok(parse_ls_remote(&output.stdout, branch))
    }

    /// Spawns a task that waits for its turn and executes one run
    fn spawn_run(&self, request: RunRequest) -> tokio::task::JoinHandle<()> {
        let semaphore = Arc::clone(&self.semaphore);
        let execution = Arc::clone(&self.execution);

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            let trigger = request.trigger.clone();
            match execution.execute(request).await {
                Ok(run) => info!("Run {} for {} finished: {}", run.id, trigger, run.status),
                Err(e) => error!("Failed to run pipeline for {}: {:#}", trigger, e),
            }
        })
    }
}
