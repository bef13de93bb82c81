//! Capabilities service
//!
//! Discovers which tools this machine provides and checks a pipeline's
//! `requires` list against them before a run starts.

use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, info};

/// Tools reported by discovery when present
const KNOWN_TOOLS: &[&str] = &["git", "make", "python3", "pip3", "podman", "sh"];

/// Service trait for capability discovery and validation
pub trait CapabilitiesService: Send + Sync {
    /// Lists the Lua modules and known tools available on this machine
    ///
    /// # Returns
    /// Capability names such as `module.publish` and `tool.git`
    fn discover(&self) -> Vec<String>;

    /// Checks a pipeline's `requires` list
    ///
    /// # Arguments
    /// * `requires` - Tool names or paths to executables
    ///
    /// # Returns
    /// The required tools that could not be found, in the order given
    fn missing(&self, requires: &[String]) -> Vec<String>;
}

/// Looks tools up on `PATH` with the `which` crate
pub struct StandardCapabilitiesService {
    /// Directories to search instead of the process `PATH`
    search_path: Option<OsString>,
}

impl StandardCapabilitiesService {
    /// Service over the process `PATH`
    pub fn new() -> Self {
        Self { search_path: None }
    }

    /// Service over an explicit list of directories
    ///
    /// # Arguments
    /// * `search_path` - Directories searched in order, like `PATH` entries
    ///
    /// # Returns
    /// A service that never consults the process `PATH`
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        let search_path = std::env::join_paths(search_path).unwrap_or_default();
        Self {
            search_path: Some(search_path),
        }
    }

    /// Resolves a tool name (or a path to one) to an executable
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            None => which::which(tool),
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(tool, Some(paths), cwd)
            }
        };
        found.ok()
    }
}

impl Default for StandardCapabilitiesService {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilitiesService for StandardCapabilitiesService {
    fn discover(&self) -> Vec<String> {
        info!("Discovering runner capabilities");

        let mut capabilities: Vec<String> = [
            "log", "env", "process", "container", "fs", "git", "runtime", "deps", "make",
            "publish",
        ]
        .iter()
        .map(|module| format!("module.{}", module))
        .collect();

        for tool in KNOWN_TOOLS {
            if let Some(path) = self.locate(tool) {
                debug!("Tool '{}' found at {}", tool, path.display());
                capabilities.push(format!("tool.{}", tool));
            } else {
                debug!("Tool '{}' not found", tool);
            }
        }

        capabilities
    }

    fn missing(&self, requires: &[String]) -> Vec<String> {
        requires
            .iter()
            .filter(|tool| self.locate(tool).is_none())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_missing_tools() {
        let dir = tempfile::tempdir().unwrap();
        testing::script(dir.path(), "make", "exit 0");
        std::fs::write(dir.path().join("python3"), "not executable").unwrap();

        let service = StandardCapabilitiesService::with_search_path(vec![dir.path().to_path_buf()]);

        assert!(service.missing(&["make".to_string()]).is_empty());
        assert_eq!(
            service.missing(&["make".to_string(), "python3".to_string(), "podman".to_string()]),
            vec!["python3", "podman"]
        );
    }

    #[test]
    fn test_discover_reports_modules_and_tools() {
        let dir = tempfile::tempdir().unwrap();
        testing::script(dir.path(), "git", "exit 0");

        let service = StandardCapabilitiesService::with_search_path(vec![dir.path().to_path_buf()]);
        let capabilities = service.discover();

        assert!(capabilities.contains(&"module.publish".to_string()));
        assert!(capabilities.contains(&"tool.git".to_string()));
        assert!(!capabilities.contains(&"tool.make".to_string()));
    }

    #[test]
    fn test_explicit_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tool = testing::script(dir.path(), "build.sh", "exit 0");

        let service = StandardCapabilitiesService::with_search_path(vec![]);
        assert!(service.missing(&[tool]).is_empty());
    }
}
