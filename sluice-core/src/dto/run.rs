//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{FailureKind, Run, RunStatus};

/// Run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: String,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failed_stage: Option<String>,
    pub failure: Option<FailureKind>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        let result = run.result.as_ref();
        Self {
            id: run.id,
            pipeline: run.pipeline.clone(),
            trigger: run.trigger.to_string(),
            status: run.status,
            requested_at: run.requested_at,
            completed_at: run.completed_at,
            failed_stage: result.and_then(|r| r.failed_stage.clone()),
            failure: result.and_then(|r| r.failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{PipelineMetadata, StageMetadata};
    use crate::domain::run::RunResult;
    use crate::domain::trigger::{TriggerConfig, TriggerEvent};

    #[test]
    fn test_run_summary_conversion() {
        let metadata = PipelineMetadata {
            name: "site".to_string(),
            description: None,
            requires: vec![],
            triggers: TriggerConfig::default(),
            output: "output".to_string(),
            stages: vec![StageMetadata {
                name: "publish".to_string(),
                container: None,
                conditional: false,
            }],
        };
        let mut run = Run::new(&metadata, TriggerEvent::push("main"));
        run.start().unwrap();
        run.complete(RunResult::stage_failed(
            "publish",
            FailureKind::Publish,
            "push rejected",
            1,
        ))
        .unwrap();

        let summary = RunSummary::from(&run);
        assert_eq!(summary.id, run.id);
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.trigger, "push to main");
        assert_eq!(summary.failed_stage.as_deref(), Some("publish"));
        assert_eq!(summary.failure, Some(FailureKind::Publish));
    }
}
