//! Podman containers for stages that do not run on the host
//!
//! Each image gets one idle container per run with the workspace mounted at
//! [`CONTAINER_WORKSPACE`]. Nested `container.run()` calls form a stack; the
//! top of the stack is where [`ContainerManager::exec`] runs commands.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::process::CommandOutput;

/// Mount point of the workspace inside containers
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Runs podman and captures its output
fn podman(args: &[String]) -> Result<CommandOutput> {
    let output = Command::new("podman")
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute podman {}", args.first().map_or("", String::as_str)))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Fails unless `podman --version` works
pub fn check_podman_available() -> Result<()> {
    let output = podman(&["--version".to_string()]).context("Is podman installed?")?;
    if !output.success() {
        anyhow::bail!("podman --version exited with {}", output.exit_code);
    }
    info!("Podman is available: {}", output.stdout.trim());
    Ok(())
}

/// Container name for an image, readable and unique per run
fn container_name(run_id: Uuid, image: &str) -> String {
    let image: String = image
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
        .collect();
    let run = run_id.simple().to_string();
    format!("sluice-{}-{}", &run[..12], image.trim_matches('-'))
}

/// Path inside the container for a workspace-relative directory
fn container_dir(cwd: Option<&str>) -> String {
    match cwd.map(|dir| dir.trim_start_matches("./").trim_end_matches('/')) {
        Some(dir) if !dir.is_empty() && dir != "." => format!("{}/{}", CONTAINER_WORKSPACE, dir),
        _ => CONTAINER_WORKSPACE.to_string(),
    }
}

/// `podman run` arguments for an idle container over the workspace
///
/// The entrypoint is replaced so images with their own entrypoint stay up.
fn run_args(name: &str, image: &str, workspace: &str) -> Vec<String> {
    let mount = format!("{}:{}", workspace, CONTAINER_WORKSPACE);
    [
        "run",
        "-d",
        "--name",
        name,
        "--entrypoint",
        "/bin/sh",
        "-v",
        mount.as_str(),
        "-w",
        CONTAINER_WORKSPACE,
        image,
        "-c",
        "sleep infinity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `podman exec` arguments for one command
fn exec_args(
    name: &str,
    cmd: &str,
    args: &[String],
    cwd: Option<&str>,
    env: &[(String, String)],
) -> Vec<String> {
    let mut all = vec!["exec".to_string(), "-w".to_string(), container_dir(cwd)];
    for (key, value) in env {
        all.push("-e".to_string());
        all.push(format!("{}={}", key, value));
    }
    all.push(name.to_string());
    all.push(cmd.to_string());
    all.extend(args.iter().cloned());
    all
}

#[derive(Default)]
struct Containers {
    /// image -> container name
    by_image: HashMap<String, String>,
    /// active containers, innermost last
    stack: Vec<String>,
}

/// Containers of one run
pub struct ContainerManager {
    run_id: Uuid,
    workspace: PathBuf,
    state: Mutex<Containers>,
}

impl ContainerManager {
    pub fn new(run_id: Uuid, workspace: PathBuf) -> Self {
        Self {
            run_id,
            workspace,
            state: Mutex::new(Containers::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Containers> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the container every stage runs in unless it names its own
    pub fn start_default(&self, image: &str) -> Result<String> {
        info!("Starting default container {} for run {}", image, self.run_id);
        self.push_container(image)
    }

    /// Makes the container for `image` current, creating it on first use
    pub fn push_container(&self, image: &str) -> Result<String> {
        let mut state = self.state();

        let name = match state.by_image.get(image) {
            Some(name) => name.clone(),
            None => {
                let name = container_name(self.run_id, image);
                let workspace = self.workspace.display().to_string();
                let output = podman(&run_args(&name, image, &workspace))?;
                if !output.success() {
                    anyhow::bail!(
                        "Failed to start container for {} (exit {}): {}",
                        image,
                        output.exit_code,
                        output.stderr.trim()
                    );
                }
                info!("Started container {} for {}", name, image);
                state.by_image.insert(image.to_string(), name.clone());
                name
            }
        };

        state.stack.push(name.clone());
        debug!("Container stack depth {}", state.stack.len());
        Ok(name)
    }

    pub fn pop_container(&self) -> Option<String> {
        self.state().stack.pop()
    }

    /// Current container, or None when commands run on the host
    pub fn current_container(&self) -> Option<String> {
        self.state().stack.last().cloned()
    }

    /// Runs a command in the current container; `cwd` is workspace-relative
    pub fn exec(
        &self,
        cmd: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        let name = self
            .current_container()
            .ok_or_else(|| anyhow::anyhow!("No active container"))?;

        debug!("{}: {} {:?}", name, cmd, args);
        let output = podman(&exec_args(&name, cmd, args, cwd, env))?;
        debug!("{}: {} exited with {}", name, cmd, output.exit_code);

        Ok(output)
    }

    /// Number of containers started so far
    pub fn container_count(&self) -> usize {
        self.state().by_image.len()
    }

    /// Force-removes every container of the run
    pub fn cleanup(&self) {
        let mut state = self.state();
        state.stack.clear();
        if state.by_image.is_empty() {
            return;
        }

        info!(
            "Removing {} container(s) of run {}",
            state.by_image.len(),
            self.run_id
        );
        for (_, name) in state.by_image.drain() {
            match podman(&["rm".to_string(), "-f".to_string(), name.clone()]) {
                Ok(output) if output.success() => debug!("Removed container {}", name),
                Ok(output) => warn!("Failed to remove container {}: {}", name, output.stderr.trim()),
                Err(e) => warn!("Failed to remove container {}: {:#}", name, e),
            }
        }
    }
}

impl Drop for ContainerManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
