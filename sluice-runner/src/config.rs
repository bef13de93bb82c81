//! Runner configuration
//!
//! Defines all configurable parameters for the runner including the
//! workspace location, polling intervals and publish identity.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the pipeline runs in (the checked out repository)
    pub workspace: PathBuf,

    /// Pipeline definition file, relative to the workspace unless absolute
    pub pipeline_file: PathBuf,

    /// Git remote watched for pushes and used as the default publish target
    pub remote: String,

    /// How often the scheduler checks cron ticks and watched branches
    pub poll_interval: Duration,

    /// How often buffered logs are flushed to the run log
    pub log_flush_interval: Duration,

    /// Image every run starts in; commands run on the host when unset
    pub default_container_image: Option<String>,

    /// Author used for publish commits
    pub git_author_name: String,
    pub git_author_email: String,

    /// Skip the push in publish steps
    pub dry_run: bool,
}

impl Config {
    /// Creates a configuration with defaults for the given workspace
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            pipeline_file: PathBuf::from("pipeline.lua"),
            remote: "origin".to_string(),
            poll_interval: Duration::from_secs(60),
            log_flush_interval: Duration::from_secs(5),
            default_container_image: None,
            git_author_name: "sluice".to_string(),
            git_author_email: "sluice@localhost".to_string(),
            dry_run: false,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SLUICE_WORKSPACE (default: current directory)
    /// - SLUICE_PIPELINE (default: pipeline.lua)
    /// - SLUICE_REMOTE (default: origin)
    /// - SLUICE_POLL_INTERVAL (seconds, default: 60)
    /// - SLUICE_LOG_FLUSH_INTERVAL (seconds, default: 5)
    /// - SLUICE_CONTAINER_IMAGE (default: none, run on the host)
    /// - SLUICE_GIT_AUTHOR_NAME / SLUICE_GIT_AUTHOR_EMAIL
    /// - SLUICE_DRY_RUN (true/1 to enable)
    pub fn from_env() -> anyhow::Result<Self> {
        let workspace = match std::env::var("SLUICE_WORKSPACE") {
            Ok(path) => PathBuf::from(path),
            Err(_) => std::env::current_dir()
                .map_err(|e| anyhow::anyhow!("Failed to determine current directory: {}", e))?,
        };

        let mut config = Self::new(workspace);

        if let Ok(pipeline) = std::env::var("SLUICE_PIPELINE") {
            config.pipeline_file = PathBuf::from(pipeline);
        }

        if let Ok(remote) = std::env::var("SLUICE_REMOTE") {
            config.remote = remote;
        }

        config.poll_interval = std::env::var("SLUICE_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.poll_interval);

        config.log_flush_interval = std::env::var("SLUICE_LOG_FLUSH_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.log_flush_interval);

        config.default_container_image = std::env::var("SLUICE_CONTAINER_IMAGE")
            .ok()
            .filter(|image| !image.trim().is_empty());

        if let Ok(name) = std::env::var("SLUICE_GIT_AUTHOR_NAME") {
            config.git_author_name = name;
        }

        if let Ok(email) = std::env::var("SLUICE_GIT_AUTHOR_EMAIL") {
            config.git_author_email = email;
        }

        config.dry_run = std::env::var("SLUICE_DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }

    /// Absolute path of the pipeline definition
    pub fn pipeline_path(&self) -> PathBuf {
        if self.pipeline_file.is_absolute() {
            self.pipeline_file.clone()
        } else {
            self.workspace.join(&self.pipeline_file)
        }
    }

    /// Directory holding runner state (`.sluice` inside the workspace)
    pub fn state_dir(&self) -> PathBuf {
        state_dir(&self.workspace)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.workspace.is_dir() {
            anyhow::bail!(
                "workspace '{}' is not a directory",
                self.workspace.display()
            );
        }

        if self.remote.trim().is_empty() {
            anyhow::bail!("remote cannot be empty");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_flush_interval.as_secs() == 0 {
            anyhow::bail!("log_flush_interval must be greater than 0");
        }

        if self.git_author_name.trim().is_empty() || self.git_author_email.trim().is_empty() {
            anyhow::bail!("git author name and email cannot be empty");
        }

        Ok(())
    }
}

/// Runner state directory for a workspace
pub fn state_dir(workspace: &Path) -> PathBuf {
    workspace.join(".sluice")
}

impl Default for Config {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.log_flush_interval, Duration::from_secs(5));
        assert_eq!(config.remote, "origin");
        assert!(config.default_container_image.is_none());
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path());

        assert!(config.validate().is_ok());

        config.poll_interval = Duration::from_secs(0);
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_secs(30);

        config.remote = " ".to_string();
        assert!(config.validate().is_err());
        config.remote = "origin".to_string();

        config.git_author_email = String::new();
        assert!(config.validate().is_err());
        config.git_author_email = "ci@example.org".to_string();

        config.workspace = dir.path().join("missing");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_path() {
        let mut config = Config::new("/srv/site");
        assert_eq!(config.pipeline_path(), PathBuf::from("/srv/site/pipeline.lua"));

        config.pipeline_file = PathBuf::from("/etc/sluice/site.lua");
        assert_eq!(config.pipeline_path(), PathBuf::from("/etc/sluice/site.lua"));
        assert_eq!(config.state_dir(), PathBuf::from("/srv/site/.sluice"));
    }
}
