//! Execution context for pipeline runs
//!
//! Contains all state needed while a run executes:
//! - Log buffer and the stage currently running
//! - Workspace root and path resolution inside it
//! - Run variables exposed through `env`
//! - The first failure a module recorded for the current stage
//! - What the publish step pushed
//! - Container manager for commands that run inside containers

use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::run::{FailureKind, PublishedArtifact, Run};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::StepError;
use crate::podman::ContainerManager;
use crate::process::{self, CommandOutput};
use crate::secrets::SecretStore;
use crate::service::LogBufferService;

/// Failure recorded by a runner module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
    pub exit_code: i32,
}

/// Identity used for commits created by the runner
#[derive(Debug, Clone)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Execution context shared across pipeline execution
pub struct Context {
    pub run_id: Uuid,
    workspace: PathBuf,

    /// Output directory declared by the pipeline, relative to the workspace
    pub output_dir: String,

    /// Variables visible to scripts through `env`
    pub vars: HashMap<String, String>,

    /// Git remote used when a step does not name one
    pub remote: String,
    pub git_identity: GitIdentity,
    pub dry_run: bool,

    log_buffer: Arc<dyn LogBufferService>,
    secrets: Arc<dyn SecretStore>,
    current_stage: Mutex<Option<String>>,
    failure: Mutex<Option<StepFailure>>,
    published: Mutex<Option<PublishedArtifact>>,

    /// Container manager for this run
    pub container_manager: ContainerManager,
}

impl Context {
    pub fn new(
        run: &Run,
        config: &Config,
        vars: HashMap<String, String>,
        log_buffer: Arc<dyn LogBufferService>,
        secrets: Arc<dyn SecretStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_id: run.id,
            workspace: config.workspace.clone(),
            output_dir: run.output_dir.clone(),
            vars,
            remote: config.remote.clone(),
            git_identity: GitIdentity {
                name: config.git_author_name.clone(),
                email: config.git_author_email.clone(),
            },
            dry_run: config.dry_run,
            log_buffer,
            secrets,
            current_stage: Mutex::new(None),
            failure: Mutex::new(None),
            published: Mutex::new(None),
            container_manager: ContainerManager::new(run.id, config.workspace.clone()),
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolves a workspace-relative path
    ///
    /// Absolute paths and paths climbing out with `..` are rejected.
    pub fn resolve_path(&self, relative: &str) -> Result<PathBuf, StepError> {
        let path = Path::new(relative);
        let inside = path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !inside {
            return Err(StepError::OutsideWorkspace(relative.to_string()));
        }

        Ok(self.workspace.join(path))
    }

    /// Removes the pipeline's output directory if it exists
    ///
    /// Returns whether anything was removed. The output directory never
    /// carries over between runs.
    pub fn discard_output(&self) -> Result<bool, StepError> {
        let path = self.resolve_path(&self.output_dir)?;
        if path == self.workspace || !path.starts_with(&self.workspace) {
            return Err(StepError::OutsideWorkspace(self.output_dir.clone()));
        }
        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_dir_all(&path).map_err(|e| {
            StepError::io(format!("failed to remove output directory '{}'", self.output_dir), e)
        })?;
        debug!("Removed output directory {}", path.display());
        Ok(true)
    }

    /// Looks up a secret by name
    pub fn secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name)
    }

    /// Runs a command in the current container, or on the host when no
    /// container is active
    pub fn exec(
        &self,
        cmd: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
    ) -> Result<CommandOutput, StepError> {
        if self.container_manager.current_container().is_some() {
            if let Some(dir) = cwd {
                self.resolve_path(dir)?;
            }
            return self
                .container_manager
                .exec(cmd, args, cwd, env)
                .map_err(|e| StepError::Launch {
                    command: process::command_line(cmd, args),
                    reason: format!("{:#}", e),
                });
        }

        let dir = match cwd {
            Some(dir) => self.resolve_path(dir)?,
            None => self.workspace.clone(),
        };
        process::run_host(cmd, args, &dir, env)
    }

    /// Like [`Context::exec`] but a non-zero exit becomes an error; output is
    /// logged at debug level on success and at error level on failure
    pub fn exec_checked(
        &self,
        cmd: &str,
        args: &[String],
        cwd: Option<&str>,
    ) -> Result<CommandOutput, StepError> {
        let output = self.exec(cmd, args, cwd, &[])?;

        let level = if output.success() {
            LogLevel::Debug
        } else {
            LogLevel::Error
        };
        for text in [&output.stdout, &output.stderr] {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                self.log(level, trimmed);
            }
        }

        if !output.success() {
            return Err(StepError::NonZeroExit {
                command: process::command_line(cmd, args),
                code: output.exit_code,
            });
        }

        Ok(output)
    }

    /// Marks the start of a stage; clears any failure left by the previous one
    pub fn enter_stage(&self, name: &str) {
        *lock(&self.current_stage) = Some(name.to_string());
        *lock(&self.failure) = None;
    }

    pub fn leave_stage(&self) {
        *lock(&self.current_stage) = None;
    }

    pub fn current_stage(&self) -> Option<String> {
        lock(&self.current_stage).clone()
    }

    /// Records a step failure and converts it into a Lua error
    ///
    /// Only the first failure of a stage is kept; it is what the run reports.
    pub fn fail(&self, kind: FailureKind, error: StepError) -> mlua::Error {
        let message = error.to_string();
        debug!("Step failed ({}): {}", kind, message);

        self.log_error(format!("{}: {}", kind, message));

        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(StepFailure {
                kind,
                message: message.clone(),
                exit_code: error.exit_code(),
            });
        }

        mlua::Error::RuntimeError(message)
    }

    /// Takes the failure recorded for the current stage
    pub fn take_failure(&self) -> Option<StepFailure> {
        lock(&self.failure).take()
    }

    pub fn record_published(&self, artifact: PublishedArtifact) {
        *lock(&self.published) = Some(artifact);
    }

    pub fn published(&self) -> Option<PublishedArtifact> {
        lock(&self.published).clone()
    }

    /// Adds a log entry tagged with the current stage
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_buffer
            .add_entry(LogEntry::new(level, self.current_stage(), message));
    }

    pub fn log_debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_resolve_path_stays_in_workspace() {
        let (dir, context, _logs) = testing::context();

        assert_eq!(
            context.resolve_path("output").unwrap(),
            dir.path().join("output")
        );
        assert_eq!(
            context.resolve_path("./site/data").unwrap(),
            dir.path().join("./site/data")
        );
        assert!(matches!(
            context.resolve_path("../elsewhere"),
            Err(StepError::OutsideWorkspace(_))
        ));
        assert!(context.resolve_path("/etc").is_err());
        assert!(context.resolve_path("a/../../b").is_err());
    }

    #[test]
    fn test_discard_output() {
        let (dir, context, _logs) = testing::context();
        assert!(!context.discard_output().unwrap());

        std::fs::create_dir_all(dir.path().join("output/css")).unwrap();
        std::fs::write(dir.path().join("output/css/old.css"), "stale").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "source").unwrap();

        assert!(context.discard_output().unwrap());
        assert!(!dir.path().join("output").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_discard_output_never_removes_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let mut metadata = testing::metadata(&["stage"]);
        metadata.output = ".".to_string();
        let run = Run::new(&metadata, sluice_core::domain::trigger::TriggerEvent::push("main"));
        let context = Context::new(
            &run,
            &Config::new(dir.path()),
            HashMap::new(),
            Arc::new(crate::service::InMemoryLogBuffer::new()),
            Arc::new(crate::secrets::StaticSecretStore::new()),
        );

        assert!(matches!(
            context.discard_output(),
            Err(StepError::OutsideWorkspace(_))
        ));
        assert!(dir.path().join("Makefile").exists());
    }

    #[test]
    fn test_logs_carry_current_stage() {
        let (_dir, context, logs) = testing::context();

        context.log_info("before");
        context.enter_stage("build");
        context.log_warning("during");
        context.leave_stage();

        let entries = logs.drain();
        assert_eq!(entries[0].stage, None);
        assert_eq!(entries[1].stage.as_deref(), Some("build"));
        assert_eq!(entries[1].level, LogLevel::Warning);
    }

    #[test]
    fn test_first_failure_wins_and_resets_per_stage() {
        let (_dir, context, _logs) = testing::context();

        context.enter_stage("install-deps");
        let err = context.fail(
            FailureKind::Dependencies,
            StepError::NonZeroExit {
                command: "pip".to_string(),
                code: 2,
            },
        );
        assert!(err.to_string().contains("exited with status 2"));
        context.fail(FailureKind::Script, StepError::invalid("later"));

        let failure = context.take_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Dependencies);
        assert_eq!(failure.exit_code, 2);

        context.fail(FailureKind::Build, StepError::invalid("stale"));
        context.enter_stage("build");
        assert!(context.take_failure().is_none());
    }

    #[test]
    fn test_exec_checked_reports_non_zero_exit() {
        let (_dir, context, logs) = testing::context();

        let ok = context
            .exec_checked("sh", &["-c".to_string(), "echo fine".to_string()], None)
            .unwrap();
        assert_eq!(ok.stdout.trim(), "fine");

        let err = context
            .exec_checked("sh", &["-c".to_string(), "echo broken >&2; exit 4".to_string()], None)
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let entries = logs.drain();
        assert!(
            entries
                .iter()
                .any(|e| e.level == LogLevel::Error && e.message == "broken")
        );
    }
}
