//! Run domain types
//!
//! A run is one execution of a pipeline for one trigger event. Its status
//! only ever moves `Pending -> Running -> Succeeded | Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::pipeline::PipelineMetadata;
use super::trigger::TriggerEvent;

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Classification of what went wrong in a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Checkout,
    Runtime,
    Dependencies,
    Build,
    Publish,
    Filesystem,
    Command,
    /// Error raised by the pipeline script itself
    Script,
    /// Failure before any stage ran (sandbox, definition, preflight)
    Setup,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Checkout => "checkout failure",
            FailureKind::Runtime => "runtime setup failure",
            FailureKind::Dependencies => "dependency installation failure",
            FailureKind::Build => "build target failure",
            FailureKind::Publish => "publish failure",
            FailureKind::Filesystem => "filesystem failure",
            FailureKind::Command => "command failure",
            FailureKind::Script => "script error",
            FailureKind::Setup => "setup failure",
        };
        write!(f, "{}", name)
    }
}

/// Record of one stage within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// What the publish step pushed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// Workspace-relative directory that was published
    pub source_dir: String,
    pub branch: String,
    /// Remote location with credentials redacted
    pub remote: String,
    /// Commit pushed to the branch; `None` for dry runs
    pub commit: Option<String>,
}

/// Result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub exit_code: i32,
    pub failed_stage: Option<String>,
    pub failure: Option<FailureKind>,
    pub error_message: Option<String>,
    pub published: Option<PublishedArtifact>,
}

impl RunResult {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
            failed_stage: None,
            failure: None,
            error_message: None,
            published: None,
        }
    }

    /// Failure that happened outside of any stage
    pub fn failed(message: impl Into<String>) -> Self {
        Self::error(message, 1)
    }

    pub fn error(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
            failed_stage: None,
            failure: Some(FailureKind::Setup),
            error_message: Some(message.into()),
            published: None,
        }
    }

    /// Failure of a specific stage
    pub fn stage_failed(
        stage: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self {
            success: false,
            exit_code,
            failed_stage: Some(stage.into()),
            failure: Some(kind),
            error_message: Some(message.into()),
            published: None,
        }
    }

    pub fn with_published(mut self, published: Option<PublishedArtifact>) -> Self {
        self.published = published;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunStateError {
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("stage index {0} out of range")]
    UnknownStage(usize),
}

/// Run execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: TriggerEvent,
    pub status: RunStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_dir: String,
    pub stages: Vec<StageRecord>,
    pub result: Option<RunResult>,
}

impl Run {
    /// Creates a pending run with one pending record per stage
    pub fn new(pipeline: &PipelineMetadata, trigger: TriggerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.name.clone(),
            trigger,
            status: RunStatus::Pending,
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output_dir: pipeline.output.clone(),
            stages: pipeline
                .stages
                .iter()
                .map(|stage| StageRecord {
                    name: stage.name.clone(),
                    status: StageStatus::Pending,
                    started_at: None,
                    completed_at: None,
                    error: None,
                })
                .collect(),
            result: None,
        }
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), RunStateError> {
        if !self.status.can_transition_to(next) {
            return Err(RunStateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), RunStateError> {
        self.transition(RunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves the run to its terminal state according to `result`
    pub fn complete(&mut self, result: RunResult) -> Result<(), RunStateError> {
        let next = if result.success {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        self.transition(next)?;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        Ok(())
    }

    fn stage_mut(&mut self, index: usize) -> Result<&mut StageRecord, RunStateError> {
        self.stages
            .get_mut(index)
            .ok_or(RunStateError::UnknownStage(index))
    }

    pub fn begin_stage(&mut self, index: usize) -> Result<(), RunStateError> {
        let stage = self.stage_mut(index)?;
        stage.status = StageStatus::Running;
        stage.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn finish_stage(&mut self, index: usize) -> Result<(), RunStateError> {
        let stage = self.stage_mut(index)?;
        stage.status = StageStatus::Succeeded;
        stage.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail_stage(&mut self, index: usize, error: impl Into<String>) -> Result<(), RunStateError> {
        let stage = self.stage_mut(index)?;
        stage.status = StageStatus::Failed;
        stage.completed_at = Some(Utc::now());
        stage.error = Some(error.into());
        Ok(())
    }

    pub fn skip_stage(&mut self, index: usize) -> Result<(), RunStateError> {
        let stage = self.stage_mut(index)?;
        stage.status = StageStatus::Skipped;
        Ok(())
    }

    /// Names of stages that actually started, in execution order
    pub fn executed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !matches!(s.status, StageStatus::Pending | StageStatus::Skipped))
            .map(|s| s.name.as_str())
            .collect()
    }
}
