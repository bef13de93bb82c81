//! Publish module: pushes a directory to a static hosting branch
//!
//! The directory is copied to a staging area under `.sluice/publish/<run-id>`,
//! committed there as a single orphan commit and force-pushed to the target
//! branch. Git runs on the host so the credential never enters a container.
//!
//! The credential is looked up by name from the secret store. It is only
//! needed for `http(s)` remotes, where git receives it as a basic-auth
//! `http.extraHeader` through `GIT_CONFIG_*` environment variables; it never
//! appears in git's arguments and is redacted from everything that gets
//! logged or recorded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mlua::prelude::*;
use sluice_core::domain::run::{FailureKind, PublishedArtifact};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::state_dir;
use crate::context::Context;
use crate::error::StepError;
use crate::process::{self, command_line};
use crate::secrets::redact;

pub const STUBS: &str = r#"---@meta

---Static site publishing module
---@class publish
publish = {}

---@class PagesOptions
---@field dir? string Directory to publish, relative to the workspace (default: the pipeline output)
---@field branch? string Hosting branch (default: "gh-pages")
---@field token? string Name of the secret holding the push credential (default: "GITHUB_TOKEN")
---@field remote? string Remote URL or path (default: the workspace's configured remote)
---@field message? string Commit message
---@field nojekyll? boolean Add an empty .nojekyll file (default: true)

---Publish a directory to a hosting branch, replacing its previous content
---@param options? PagesOptions
---@return string? commit The pushed commit, nil in dry-run mode
function publish.pages(options) end
"#;

const DEFAULT_BRANCH: &str = "gh-pages";
const DEFAULT_TOKEN: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone)]
pub struct PagesOptions {
    pub dir: String,
    pub branch: String,
    pub token: String,
    pub remote: Option<String>,
    pub message: Option<String>,
    pub nojekyll: bool,
}

impl PagesOptions {
    fn from_lua(context: &Context, options: Option<LuaTable>) -> LuaResult<Self> {
        let mut pages = Self {
            dir: context.output_dir.clone(),
            branch: DEFAULT_BRANCH.to_string(),
            token: DEFAULT_TOKEN.to_string(),
            remote: None,
            message: None,
            nojekyll: true,
        };

        if let Some(options) = options {
            if let Some(dir) = options.get::<Option<String>>("dir")? {
                pages.dir = dir;
            }
            if let Some(branch) = options.get::<Option<String>>("branch")? {
                pages.branch = branch;
            }
            if let Some(token) = options.get::<Option<String>>("token")? {
                pages.token = token;
            }
            pages.remote = options.get("remote")?;
            pages.message = options.get("message")?;
            if let Some(nojekyll) = options.get::<Option<bool>>("nojekyll")? {
                pages.nojekyll = nojekyll;
            }
        }

        Ok(pages)
    }
}

fn is_http(remote: &str) -> bool {
    remote.starts_with("https://") || remote.starts_with("http://")
}

/// True for plain filesystem paths (not `scheme://` URLs or `host:path`)
fn is_local_path(remote: &str) -> bool {
    if remote.contains("://") {
        return false;
    }
    match (remote.find(':'), remote.find('/')) {
        (Some(colon), Some(slash)) => slash < colon,
        (Some(_), None) => false,
        _ => true,
    }
}

/// Splits `scheme://[userinfo@]rest` into `(scheme, rest)`
fn split_userinfo(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let rest = match rest[..authority_end].rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    };
    Some((scheme, rest))
}

/// Git configuration that authenticates http(s) pushes with `token`
///
/// # Arguments
/// * `token` - Access token, sent as the password of `x-access-token`
///
/// # Returns
/// Environment variables for the git process
pub fn auth_env(token: &str) -> Vec<(String, String)> {
    let credentials = STANDARD.encode(format!("x-access-token:{}", token));
    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        (
            "GIT_CONFIG_VALUE_0".to_string(),
            format!("Authorization: Basic {}", credentials),
        ),
    ]
}

/// Removes userinfo from a URL
pub fn redact_remote(url: &str) -> String {
    match split_userinfo(url) {
        Some((scheme, rest)) => format!("{}://{}", scheme, rest),
        None => url.to_string(),
    }
}

fn validate_branch(branch: &str) -> Result<(), StepError> {
    let invalid = branch.is_empty()
        || branch.starts_with('-')
        || branch.contains(|c: char| c.is_whitespace() || c == ':' || c == '~' || c == '^')
        || branch.contains("..");
    if invalid {
        return Err(StepError::invalid(format!("invalid branch name '{}'", branch)));
    }
    Ok(())
}

/// Copies a directory tree, skipping version control and runner state
fn copy_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" || name == ".sluice" {
            continue;
        }
        let from = entry.path();
        let to = target.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

struct Publisher<'a> {
    context: &'a Context,
    program: &'a str,
    token: Option<String>,
}

impl Publisher<'_> {
    /// Runs git on the host; output and errors are redacted
    fn git(&self, cwd: &Path, args: &[String]) -> Result<String, StepError> {
        let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
        if let Some(token) = &self.token {
            env.extend(auth_env(token));
        }
        let secret = self.token.as_deref();

        let output = process::run_host(self.program, args, cwd, &env).map_err(|e| {
            StepError::invalid(redact(&e.to_string(), secret))
        })?;

        if !output.success() {
            let stderr = redact(output.stderr.trim(), secret);
            if !stderr.is_empty() {
                self.context.log_error(stderr);
            }
            return Err(StepError::NonZeroExit {
                command: redact(&command_line("git", args), secret),
                code: output.exit_code,
            });
        }

        Ok(output.stdout.trim().to_string())
    }

    fn resolve_remote(&self, remote: Option<String>) -> Result<String, StepError> {
        let remote = match remote {
            Some(remote) => remote,
            None => self
                .git(
                    self.context.workspace(),
                    &strings(&["remote", "get-url", &self.context.remote]),
                )
                .map_err(|_| {
                    StepError::invalid(format!(
                        "no remote given and '{}' is not configured in the workspace",
                        self.context.remote
                    ))
                })?,
        };

        if is_local_path(&remote) && Path::new(&remote).is_relative() {
            return Ok(self.context.workspace().join(&remote).to_string_lossy().to_string());
        }

        Ok(remote)
    }

    fn commit_and_push(
        &self,
        staging: &Path,
        options: &PagesOptions,
        push_url: &str,
    ) -> Result<String, StepError> {
        let identity = &self.context.git_identity;
        let message = options.message.clone().unwrap_or_else(|| {
            format!("Publish {} from run {}", options.dir, self.context.run_id)
        });

        self.git(staging, &strings(&["init", "-q"]))?;
        self.git(
            staging,
            &strings(&["symbolic-ref", "HEAD", &format!("refs/heads/{}", options.branch)]),
        )?;
        self.git(staging, &strings(&["add", "-A"]))?;
        self.git(
            staging,
            &strings(&[
                "-c",
                &format!("user.name={}", identity.name),
                "-c",
                &format!("user.email={}", identity.email),
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                &message,
            ]),
        )?;
        let commit = self.git(staging, &strings(&["rev-parse", "HEAD"]))?;

        self.context.log_info(format!(
            "Pushing {} to {} ({})",
            commit,
            options.branch,
            redact_remote(push_url)
        ));
        self.git(
            staging,
            &strings(&[
                "push",
                "--force",
                "-q",
                push_url,
                &format!("HEAD:refs/heads/{}", options.branch),
            ]),
        )?;

        Ok(commit)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Publishes according to `options`, returning the pushed commit
///
/// Returns `Ok(None)` in dry-run mode.
pub fn publish_pages(context: &Context, options: PagesOptions) -> Result<Option<String>, StepError> {
    publish_with(context, options, "git")
}

fn publish_with(
    context: &Context,
    options: PagesOptions,
    program: &str,
) -> Result<Option<String>, StepError> {
    validate_branch(&options.branch)?;

    let source = context.resolve_path(&options.dir)?;
    if !source.is_dir() {
        return Err(StepError::invalid(format!(
            "publish directory '{}' does not exist",
            options.dir
        )));
    }

    let mut publisher = Publisher {
        context,
        program,
        token: None,
    };
    let remote = publisher.resolve_remote(options.remote.clone())?;

    let push_url = if is_http(&remote) {
        let token = context.secret(&options.token).ok_or_else(|| {
            StepError::invalid(format!(
                "secret '{}' is required to push to {}",
                options.token,
                redact_remote(&remote)
            ))
        })?;
        publisher.token = Some(token);
        redact_remote(&remote)
    } else {
        remote.clone()
    };

    let mut artifact = PublishedArtifact {
        source_dir: options.dir.clone(),
        branch: options.branch.clone(),
        remote: redact_remote(&remote),
        commit: None,
    };

    if context.dry_run {
        context.log_info(format!(
            "Dry run: not pushing '{}' to {} ({})",
            options.dir, options.branch, artifact.remote
        ));
        context.record_published(artifact);
        return Ok(None);
    }

    let staging: PathBuf = state_dir(context.workspace())
        .join("publish")
        .join(context.run_id.to_string());
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .map_err(|e| StepError::io("failed to clear publish staging directory", e))?;
    }

    let result = copy_dir(&source, &staging)
        .map_err(|e| StepError::io(format!("failed to stage '{}'", options.dir), e))
        .and_then(|_| {
            if options.nojekyll {
                std::fs::write(staging.join(".nojekyll"), "")
                    .map_err(|e| StepError::io("failed to write .nojekyll", e))?;
            }
            publisher.commit_and_push(&staging, &options, &push_url)
        });

    if let Err(e) = std::fs::remove_dir_all(&staging) {
        context.log_warning(format!("Failed to remove publish staging directory: {}", e));
    }

    let commit = result?;
    context.log_info(format!(
        "Published '{}' to {} at {}",
        options.dir, options.branch, commit
    ));

    artifact.commit = Some(commit.clone());
    context.record_published(artifact);

    Ok(Some(commit))
}

pub fn register_publish_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let publish_table = lua.create_table()?;

    {
        let context = context.clone();
        publish_table.set(
            "pages",
            lua.create_function(move |_, options: Option<LuaTable>| {
                let options = PagesOptions::from_lua(&context, options)?;
                publish_pages(&context, options).map_err(|e| context.fail(FailureKind::Publish, e))
            })?,
        )?;
    }

    lua.globals().set("publish", publish_table)?;
    Ok(())
}
