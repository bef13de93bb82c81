//! Git module: fetching the source under build

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;

use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Source checkout module
---@class git
git = {}

---@class CheckoutOptions
---@field url? string Repository to fetch from; required when the workspace is not a repository yet
---@field ref? string Branch, tag or commit to check out (default: the remote HEAD when url is set)
---@field force? boolean Discard uncommitted changes to tracked files (default: false)

---Check out the source into the workspace
---Without options the workspace is used as it is. Fetching into a workspace
---with uncommitted changes to tracked files fails unless force is set.
---@param options? CheckoutOptions
---@return string sha The checked out commit
function git.checkout(options) end

---Commit currently checked out in the workspace
---@return string sha
function git.head() end
"#;

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn head(context: &Context) -> Result<String, StepError> {
    let output = context.exec_checked("git", &args(&["rev-parse", "HEAD"]), None)?;
    Ok(output.stdout.trim().to_string())
}

/// Tracked files with uncommitted changes, as `git status --porcelain` lines
fn local_changes(context: &Context) -> Result<Vec<String>, StepError> {
    let output = context.exec_checked(
        "git",
        &args(&["status", "--porcelain", "--untracked-files=no"]),
        None,
    )?;
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Default)]
struct CheckoutOptions {
    url: Option<String>,
    git_ref: Option<String>,
    force: bool,
}

fn checkout(context: &Context, options: CheckoutOptions) -> Result<String, StepError> {
    let CheckoutOptions { url, git_ref, force } = options;
    let existing_repo = context.workspace().join(".git").exists();

    if !existing_repo {
        if url.is_none() {
            return Err(StepError::invalid(
                "workspace is not a git repository and no url was given",
            ));
        }
        context.exec_checked("git", &args(&["init", "-q"]), None)?;
    }

    let remote = context.remote.as_str();

    if let Some(url) = url.as_deref() {
        let existing = context.exec("git", &args(&["remote", "get-url", remote]), None, &[])?;
        if !existing.success() {
            context.exec_checked("git", &args(&["remote", "add", remote, url]), None)?;
        } else if existing.stdout.trim() != url {
            context.exec_checked("git", &args(&["remote", "set-url", remote, url]), None)?;
        }
    }

    if url.is_some() || git_ref.is_some() {
        let git_ref = git_ref.unwrap_or_else(|| "HEAD".to_string());
        context.log_info(format!("Fetching {} from {}", git_ref, remote));
        context.exec_checked("git", &args(&["fetch", "-q", remote, git_ref.as_str()]), None)?;

        if existing_repo && !force {
            let changes = local_changes(context)?;
            if !changes.is_empty() {
                return Err(StepError::invalid(format!(
                    "workspace has uncommitted changes to {} tracked file(s) ({}); commit or stash them, or pass force = true",
                    changes.len(),
                    changes.join(", ")
                )));
            }
        }

        context.exec_checked("git", &args(&["checkout", "-q", "--force", "FETCH_HEAD"]), None)?;
    }

    head(context)
}

pub fn register_git_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let git_table = lua.create_table()?;

    // git.checkout(options?)
    {
        let context = context.clone();
        git_table.set(
            "checkout",
            lua.create_function(move |_, options: Option<LuaTable>| {
                let options = match options {
                    Some(options) => CheckoutOptions {
                        url: options.get("url")?,
                        git_ref: options.get("ref")?,
                        force: options.get::<Option<bool>>("force")?.unwrap_or(false),
                    },
                    None => CheckoutOptions::default(),
                };

                let sha = checkout(&context, options)
                    .map_err(|e| context.fail(FailureKind::Checkout, e))?;

                context.log_info(format!("Checked out {}", sha));
                Ok(sha)
            })?,
        )?;
    }

    // git.head()
    {
        let context = context.clone();
        git_table.set(
            "head",
            lua.create_function(move |_, ()| {
                head(&context).map_err(|e| context.fail(FailureKind::Checkout, e))
            })?,
        )?;
    }

    lua.globals().set("git", git_table)?;
    Ok(())
}
