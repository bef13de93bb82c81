//! Dependency installation module

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;

use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Dependency installation module
---@class deps
deps = {}

---@class PipOptions
---@field python? string Interpreter to install with (default: "python3")
---@field manifest? string Requirements file, relative to the workspace (default: "requirements.txt")
---@field upgrade? boolean Upgrade pip itself first (default: true)

---Install the dependencies declared in a requirements manifest
---@param options? PipOptions
function deps.pip(options) end
"#;

fn pip(context: &Context, python: &str, manifest: &str, upgrade: bool) -> Result<(), StepError> {
    let manifest_path = context.resolve_path(manifest)?;
    if !manifest_path.is_file() {
        return Err(StepError::invalid(format!(
            "dependency manifest '{}' not found",
            manifest
        )));
    }

    let pip_install = |extra: &[&str]| {
        let mut args: Vec<String> = ["-m", "pip", "install"].iter().map(|s| s.to_string()).collect();
        args.extend(extra.iter().map(|s| s.to_string()));
        context.exec_checked(python, &args, None)
    };

    if upgrade {
        context.log_info("Upgrading pip");
        pip_install(&["--upgrade", "pip"])?;
    }

    context.log_info(format!("Installing dependencies from {}", manifest));
    pip_install(&["-r", manifest])?;

    Ok(())
}

pub fn register_deps_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let deps_table = lua.create_table()?;

    {
        let context = context.clone();
        deps_table.set(
            "pip",
            lua.create_function(move |_, options: Option<LuaTable>| {
                let (python, manifest, upgrade) = match options {
                    Some(options) => (
                        options.get::<Option<String>>("python")?,
                        options.get::<Option<String>>("manifest")?,
                        options.get::<Option<bool>>("upgrade")?,
                    ),
                    None => (None, None, None),
                };
                let python = python.unwrap_or_else(|| "python3".to_string());
                let manifest = manifest.unwrap_or_else(|| "requirements.txt".to_string());

                pip(&context, &python, &manifest, upgrade.unwrap_or(true))
                    .map_err(|e| context.fail(FailureKind::Dependencies, e))
            })?,
        )?;
    }

    lua.globals().set("deps", deps_table)?;
    Ok(())
}
