//! Execution service
//!
//! Handles a run from trigger to terminal state:
//! - Validating the trigger against the pipeline's declared triggers
//! - Preflight checks of the tools the pipeline requires
//! - Executing the stages in a blocking task with a fresh Lua sandbox
//! - Flushing logs periodically and persisting the run record
//!
//! This service contains the core business logic for running pipelines.

use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use sluice_core::domain::run::{Run, RunResult};
use sluice_core::domain::trigger::TriggerEvent;
use sluice_lua::parse_pipeline_metadata;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::Context;
use crate::lua::executor::LuaExecutor;
use crate::repository::RunRepository;
use crate::secrets::SecretStore;
use crate::service::capabilities::CapabilitiesService;
use crate::service::log_buffer::{InMemoryLogBuffer, LogBufferService};

/// A request to run a pipeline
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub pipeline_source: String,
    pub trigger: TriggerEvent,
    /// Extra variables exposed to scripts through `env`
    pub vars: HashMap<String, String>,
}

impl RunRequest {
    pub fn new(pipeline_source: impl Into<String>, trigger: TriggerEvent) -> Self {
        Self {
            pipeline_source: pipeline_source.into(),
            trigger,
            vars: HashMap::new(),
        }
    }
}

/// Service trait for executing pipeline runs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes a pipeline for a trigger event
    ///
    /// Returns an error when no run could be created (invalid definition,
    /// trigger not accepted, storage failure). Once a run exists it is
    /// returned in a terminal state, whether it succeeded or failed.
    async fn execute(&self, request: RunRequest) -> Result<Run>;
}

/// Variables visible to scripts for a run
///
/// Built-in `SLUICE_*` variables take precedence over `extra`.
pub fn run_vars(
    run: &Run,
    config: &Config,
    extra: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut vars = extra.clone();

    vars.insert("SLUICE_RUN_ID".to_string(), run.id.to_string());
    vars.insert("SLUICE_PIPELINE".to_string(), run.pipeline.clone());
    vars.insert("SLUICE_TRIGGER".to_string(), run.trigger.kind().to_string());
    vars.insert("SLUICE_OUTPUT_DIR".to_string(), run.output_dir.clone());
    vars.insert(
        "SLUICE_WORKSPACE".to_string(),
        config.workspace.to_string_lossy().to_string(),
    );

    match &run.trigger {
        TriggerEvent::Push { branch } => {
            vars.insert("SLUICE_BRANCH".to_string(), branch.clone());
        }
        TriggerEvent::Schedule { tick } => {
            vars.insert("SLUICE_SCHEDULE_TICK".to_string(), tick.to_rfc3339());
        }
    }

    vars
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    config: Config,
    repository: Arc<dyn RunRepository>,
    capabilities: Arc<dyn CapabilitiesService>,
    secrets: Arc<dyn SecretStore>,
}

impl StandardExecutionService {
    pub fn new(
        config: Config,
        repository: Arc<dyn RunRepository>,
        capabilities: Arc<dyn CapabilitiesService>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            config,
            repository,
            capabilities,
            secrets,
        }
    }

    /// Spawns a background task that flushes logs periodically
    ///
    /// Sending on the returned channel makes the task flush one last time
    /// and exit.
    fn spawn_log_flusher(
        run_id: Uuid,
        buffer: Arc<dyn LogBufferService>,
        repository: Arc<dyn RunRepository>,
        interval: Duration,
    ) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                let stopping = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = &mut stop_rx => true,
                };

                let logs = buffer.drain();
                if !logs.is_empty() {
                    debug!("Flushing {} logs for run {}", logs.len(), run_id);
                    if let Err(e) = repository.append_logs(run_id, &logs).await {
                        error!("Failed to flush logs for run {}: {}", run_id, e);
                    }
                }

                if stopping {
                    break;
                }
            }
        });

        (stop_tx, handle)
    }

    /// Runs the stages on a blocking thread and returns the finished run
    ///
    /// A panic in the pipeline task fails the run; the run is then returned
    /// as it was before its stages started.
    async fn run_stages(
        &self,
        run: Run,
        source: String,
        context: Arc<Context>,
    ) -> (Run, RunResult) {
        let default_image = self.config.default_container_image.clone();
        let snapshot = run.clone();
        let task_context = Arc::clone(&context);

        let task = tokio::task::spawn_blocking(move || {
            let context = task_context;
            let mut run = run;
            if let Some(image) = default_image {
                context.log_info(format!("Starting default container {}", image));
                if let Err(e) = context.container_manager.start_default(&image) {
                    let message = format!("Failed to start default container: {:#}", e);
                    context.log_error(message.clone());
                    return (run, RunResult::failed(message));
                }
            }

            let result = LuaExecutor::new(Arc::clone(&context)).execute_pipeline(&mut run, &source);

            if context.container_manager.container_count() > 0 {
                context.log_debug("Cleaning up containers");
                context.container_manager.cleanup();
            }

            (run, result)
        });

        match task.await {
            Ok(finished) => finished,
            Err(e) => {
                let message = format!("Pipeline task panicked: {}", e);
                error!("Run {}: {}", snapshot.id, message);
                context.log_error(message.clone());
                (snapshot, RunResult::failed(message))
            }
        }
    }
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn execute(&self, request: RunRequest) -> Result<Run> {
        let metadata = parse_pipeline_metadata(&request.pipeline_source)
            .context("Failed to parse pipeline definition")?;

        if !metadata.triggers.accepts(&request.trigger) {
            anyhow::bail!(
                "Pipeline '{}' does not accept trigger '{}'",
                metadata.name,
                request.trigger
            );
        }

        let mut run = Run::new(&metadata, request.trigger.clone());
        info!(
            "Starting run {} of pipeline '{}' ({})",
            run.id, metadata.name, run.trigger
        );

        self.repository
            .save(&run)
            .await
            .context("Failed to record run")?;

        let buffer = Arc::new(InMemoryLogBuffer::new());
        let log_buffer: Arc<dyn LogBufferService> = buffer.clone();
        let context = Context::new(
            &run,
            &self.config,
            run_vars(&run, &self.config, &request.vars),
            Arc::clone(&log_buffer),
            Arc::clone(&self.secrets),
        );

        run.start()?;
        self.repository
            .save(&run)
            .await
            .context("Failed to record run start")?;

        let (stop_flusher, flusher) = Self::spawn_log_flusher(
            run.id,
            Arc::clone(&log_buffer),
            Arc::clone(&self.repository),
            self.config.log_flush_interval,
        );

        let missing = self.capabilities.missing(&metadata.requires);
        let (mut run, result) = if missing.is_empty() {
            self.run_stages(run, request.pipeline_source, Arc::clone(&context))
                .await
        } else {
            let message = format!("Missing required tools: {}", missing.join(", "));
            warn!("Run {}: {}", run.id, message);
            context.log_error(message.clone());
            (run, RunResult::failed(message))
        };

        let _ = stop_flusher.send(());
        if let Err(e) = flusher.await {
            warn!("Log flusher for run {} panicked: {}", run.id, e);
        }

        info!(
            "Run {} completed with status: {}",
            run.id,
            if result.success { "success" } else { "failure" }
        );

        run.complete(result)?;
        self.repository
            .save(&run)
            .await
            .context("Failed to record run result")?;

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FileRunRepository;
    use crate::secrets::StaticSecretStore;
    use crate::service::capabilities::StandardCapabilitiesService;

    /// Secret store whose lookups panic
    struct BrokenSecretStore;

    impl SecretStore for BrokenSecretStore {
        fn get(&self, _name: &str) -> Option<String> {
            panic!("secret store unavailable")
        }
    }
    use sluice_core::domain::run::{FailureKind, RunStatus};

    fn service(workspace: &std::path::Path) -> (StandardExecutionService, Arc<FileRunRepository>) {
        let repository = Arc::new(FileRunRepository::new(workspace));
        let service = StandardExecutionService::new(
            Config::new(workspace),
            repository.clone(),
            Arc::new(StandardCapabilitiesService::new()),
            Arc::new(StaticSecretStore::new()),
        );
        (service, repository)
    }

    const PIPELINE: &str = r#"
        return pipeline.define {
            name = "site",
            requires = { "sh" },
            on = { push = { branches = { "main" } }, schedule = { cron = "0 6 * * *" } },
            stages = {
                pipeline.stage { name = "prepare-output", script = function() fs.mkdir("output") end },
                pipeline.stage {
                    name = "build",
                    script = function()
                        log.info("building for " .. env.get("SLUICE_TRIGGER"))
                        process.run {
                            cmd = "sh",
                            args = { "-c", "printf %s \"$BRANCH\" > output/branch.txt" },
                            env = { BRANCH = env.get("SLUICE_BRANCH", "none") },
                        }
                    end,
                },
            },
        }
    "#;

    #[tokio::test]
    async fn test_successful_run_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repository) = service(dir.path());

        let run = service
            .execute(RunRequest::new(PIPELINE, TriggerEvent::push("main")))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("output/branch.txt")).unwrap(),
            "main"
        );

        let stored = repository.get(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.executed_stages(), vec!["prepare-output", "build"]);

        let logs = repository.read_logs(run.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message == "building for push"
            && l.stage.as_deref() == Some("build")));
        assert!(
            logs.iter()
                .any(|l| l.message == "Pipeline completed successfully")
        );
    }

    #[tokio::test]
    async fn test_schedule_trigger_runs_same_stages() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repository) = service(dir.path());

        let run = service
            .execute(RunRequest::new(
                PIPELINE,
                TriggerEvent::schedule(chrono::Utc::now()),
            ))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.executed_stages(), vec!["prepare-output", "build"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("output/branch.txt")).unwrap(),
            "none"
        );
    }

    #[tokio::test]
    async fn test_panicking_task_still_finishes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(FileRunRepository::new(dir.path()));
        let service = StandardExecutionService::new(
            Config::new(dir.path()),
            repository.clone(),
            Arc::new(StandardCapabilitiesService::new()),
            Arc::new(BrokenSecretStore),
        );
        let source = r#"
            return {
                name = "site",
                on = { push = { branches = { "main" } } },
                stages = {
                    { name = "prepare-output", script = function() fs.mkdir("output") end },
                    { name = "publish", script = function()
                        publish.pages { remote = "https://example.invalid/site.git" }
                    end },
                },
            }
        "#;

        let run = service
            .execute(RunRequest::new(source, TriggerEvent::push("main")))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        let message = run.result.as_ref().unwrap().error_message.clone().unwrap();
        assert!(message.contains("panicked"), "{}", message);

        let stored = repository.get(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored.completed_at.is_some());

        let logs = repository.read_logs(run.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message.contains("Pipeline task panicked")));
    }

    #[tokio::test]
    async fn test_rejected_trigger_creates_no_run() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repository) = service(dir.path());

        let err = service
            .execute(RunRequest::new(PIPELINE, TriggerEvent::push("feature")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not accept"));
        assert!(repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tools_fail_before_stages() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repository) = service(dir.path());
        let source = PIPELINE.replace(r#"requires = { "sh" }"#, r#"requires = { "sluice-missing-tool" }"#);

        let run = service
            .execute(RunRequest::new(source, TriggerEvent::push("main")))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        let result = run.result.as_ref().unwrap();
        assert_eq!(result.failure, Some(FailureKind::Setup));
        assert!(result.error_message.as_ref().unwrap().contains("sluice-missing-tool"));
        assert!(run.executed_stages().is_empty());
        assert!(!dir.path().join("output").exists());

        let logs = repository.read_logs(run.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message.contains("Missing required tools")));
    }

    #[tokio::test]
    async fn test_request_vars_do_not_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repository) = service(dir.path());
        let source = r#"
            return {
                name = "vars",
                on = { push = { branches = { "main" } } },
                stages = {
                    { name = "write", script = function()
                        process.run {
                            cmd = "sh",
                            args = { "-c", "printf '%s %s' \"$A\" \"$B\" > vars.txt" },
                            env = { A = env.get("SLUICE_TRIGGER"), B = env.get("GREETING") },
                        }
                    end },
                },
            }
        "#;

        let mut request = RunRequest::new(source, TriggerEvent::push("main"));
        request.vars.insert("SLUICE_TRIGGER".to_string(), "forged".to_string());
        request.vars.insert("GREETING".to_string(), "hello".to_string());

        let run = service.execute(request).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("vars.txt")).unwrap(),
            "push hello"
        );
    }
}
