//! Shared helpers for runner tests

use sluice_core::domain::pipeline::{PipelineMetadata, StageMetadata};
use sluice_core::domain::run::Run;
use sluice_core::domain::trigger::{TriggerConfig, TriggerEvent};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::context::Context;
use crate::lua::modules::register_runner_modules;
use crate::secrets::{SecretStore, StaticSecretStore};
use crate::service::InMemoryLogBuffer;

pub fn metadata(stages: &[&str]) -> PipelineMetadata {
    PipelineMetadata {
        name: "test".to_string(),
        description: None,
        requires: vec![],
        triggers: TriggerConfig {
            push_branches: vec!["main".to_string()],
            schedule: None,
        },
        output: "output".to_string(),
        stages: stages
            .iter()
            .map(|name| StageMetadata {
                name: name.to_string(),
                container: None,
                conditional: false,
            })
            .collect(),
    }
}

pub fn context_with(
    config: Config,
    secrets: impl SecretStore + 'static,
) -> (Arc<Context>, InMemoryLogBuffer) {
    let run = Run::new(&metadata(&["stage"]), TriggerEvent::push("main"));
    let logs = InMemoryLogBuffer::new();
    let context = Context::new(
        &run,
        &config,
        HashMap::new(),
        Arc::new(logs.clone()),
        Arc::new(secrets),
    );
    (context, logs)
}

/// Context over a fresh temporary workspace
pub fn context() -> (TempDir, Arc<Context>, InMemoryLogBuffer) {
    let dir = tempfile::tempdir().unwrap();
    let (context, logs) = context_with(Config::new(dir.path()), StaticSecretStore::new());
    (dir, context, logs)
}

/// Sandbox with every runner module registered
pub fn lua(context: &Arc<Context>) -> mlua::Lua {
    let lua = sluice_lua::create_sandbox().unwrap();
    register_runner_modules(&lua, context).unwrap();
    lua
}

/// Writes an executable shell script and returns its absolute path
pub fn script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Runs git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(["-c", "user.name=test", "-c", "user.email=test@example.org"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialises a repository with one commit in `dir`
pub fn init_repo(dir: &Path) -> String {
    git(dir, &["init", "-q"]);
    std::fs::write(dir.join("README.md"), "site\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    git(dir, &["rev-parse", "HEAD"])
}
