//! Host command execution

use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::error::StepError;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Renders a command line for logs and error messages
pub fn command_line(cmd: &str, args: &[String]) -> String {
    if args.is_empty() {
        cmd.to_string()
    } else {
        format!("{} {}", cmd, args.join(" "))
    }
}

/// Runs a command on the host and waits for it to finish
pub fn run_host(
    cmd: &str,
    args: &[String],
    cwd: &Path,
    env: &[(String, String)],
) -> Result<CommandOutput, StepError> {
    debug!("Executing on host in {}: {} {:?}", cwd.display(), cmd, args);

    let output = Command::new(cmd)
        .args(args)
        .current_dir(cwd)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .output()
        .map_err(|e| StepError::Launch {
            command: command_line(cmd, args),
            reason: e.to_string(),
        })?;

    // Killed by a signal
    let exit_code = output.status.code().unwrap_or(-1);

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code,
    })
}
