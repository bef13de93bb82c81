//! Pipeline domain types

use serde::{Deserialize, Serialize};

use super::trigger::TriggerConfig;

/// Output directory used when a pipeline does not declare one
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Pipeline metadata extracted from a Lua definition
///
/// This structure contains the parsed metadata from a pipeline definition,
/// including triggers, requirements, and stage information (but not the executable code).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub name: String,
    pub description: Option<String>,
    /// Tools the runner must provide (e.g. "git", "make", "podman")
    pub requires: Vec<String>,
    pub triggers: TriggerConfig,
    /// Directory (relative to the workspace) that the build fills and publish consumes
    pub output: String,
    pub stages: Vec<StageMetadata>,
}

impl PipelineMetadata {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Stage metadata (name, optional container, whether it is conditional)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetadata {
    pub name: String,
    pub container: Option<String>,
    #[serde(default)]
    pub conditional: bool,
}
