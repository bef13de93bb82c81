//! Configuration module
//!
//! Handles CLI configuration: where the workspace and pipeline live, and
//! how the runner configuration is derived from them.

use anyhow::Result;
use sluice_runner::config::Config as RunnerConfig;
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace directory
    pub workspace: PathBuf,
    /// Pipeline definition, relative to the workspace unless absolute
    pub pipeline: PathBuf,
}

impl Config {
    pub fn pipeline_path(&self) -> PathBuf {
        if self.pipeline.is_absolute() {
            self.pipeline.clone()
        } else {
            self.workspace.join(&self.pipeline)
        }
    }

    /// Runner configuration from the environment, with the CLI's workspace
    /// and pipeline taking precedence
    pub fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = RunnerConfig::from_env()?;
        config.workspace = self.workspace.clone();
        config.pipeline_file = self.pipeline.clone();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_path() {
        let config = Config {
            workspace: PathBuf::from("/srv/site"),
            pipeline: PathBuf::from("ci/pipeline.lua"),
        };
        assert_eq!(config.pipeline_path(), PathBuf::from("/srv/site/ci/pipeline.lua"));

        let config = Config {
            pipeline: PathBuf::from("/etc/sluice/pipeline.lua"),
            ..config
        };
        assert_eq!(config.pipeline_path(), PathBuf::from("/etc/sluice/pipeline.lua"));
    }

    #[test]
    fn test_runner_config_uses_cli_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            workspace: dir.path().to_path_buf(),
            pipeline: PathBuf::from("site.lua"),
        };

        let runner = config.runner_config().unwrap();
        assert_eq!(runner.workspace, dir.path());
        assert_eq!(runner.pipeline_path(), dir.path().join("site.lua"));
    }

    #[test]
    fn test_runner_config_rejects_missing_workspace() {
        let config = Config {
            workspace: PathBuf::from("/nonexistent/sluice/workspace"),
            pipeline: PathBuf::from("pipeline.lua"),
        };
        assert!(config.runner_config().is_err());
    }
}
