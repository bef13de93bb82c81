//! Process module implementation for the runner
//!
//! Provides process execution to Lua scripts. Commands run inside the
//! current container, or on the host when no container is active.

use mlua::prelude::*;
use sluice_core::domain::log::LogLevel;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{string_list, string_pairs};
use crate::context::Context;
use crate::error::StepError;
use crate::process::command_line;

pub const STUBS: &str = r#"---@meta

---Process execution module
---@class process
process = {}

---@class ProcessOptions
---@field cmd string Command to execute
---@field args? string[] Command arguments
---@field cwd? string Working directory, relative to the workspace
---@field env? table<string, string> Extra environment variables
---@field check? boolean Fail the stage on a non-zero exit (default: true)
---@field capture_stdout? boolean Return stdout instead of logging it
---@field capture_stderr? boolean Return stderr instead of logging it
---@field stdout_level? "debug"|"info"|"warning"|"error" Log level for stdout (default: info)
---@field stderr_level? "debug"|"info"|"warning"|"error" Log level for stderr (default: error)

---@class ProcessResult
---@field exit_code integer
---@field stdout? string Present when capture_stdout is set
---@field stderr? string Present when capture_stderr is set

---Run a command and wait for it to finish
---@param options ProcessOptions
---@return ProcessResult
function process.run(options) end
"#;

/// Register the process module into a Lua context
pub fn register_process_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let process_table = lua.create_table()?;

    // process.run(options)
    {
        let context = context.clone();
        process_table.set(
            "run",
            lua.create_function(move |lua_ctx, options: LuaTable| {
                let cmd: String = options.get("cmd").map_err(|_| {
                    context.fail(
                        FailureKind::Command,
                        StepError::invalid("process.run requires 'cmd' field"),
                    )
                })?;

                let args = string_list(options.get("args")?)?;
                let env = string_pairs(options.get("env")?)?;
                let check: bool = options.get::<Option<bool>>("check")?.unwrap_or(true);
                let capture_stdout: bool = options.get::<Option<bool>>("capture_stdout")?.unwrap_or(false);
                let capture_stderr: bool = options.get::<Option<bool>>("capture_stderr")?.unwrap_or(false);
                let stdout_level: String = options
                    .get::<Option<String>>("stdout_level")?
                    .unwrap_or_else(|| "info".to_string());
                let stderr_level: String = options
                    .get::<Option<String>>("stderr_level")?
                    .unwrap_or_else(|| "error".to_string());
                let cwd: Option<String> = options.get("cwd")?;

                debug!("Executing process: {} {:?}", cmd, args);

                let output = context
                    .exec(&cmd, &args, cwd.as_deref(), &env)
                    .map_err(|e| context.fail(FailureKind::Command, e))?;

                if !capture_stdout {
                    log_output(&context, &output.stdout, &stdout_level);
                }

                if !capture_stderr {
                    log_output(&context, &output.stderr, &stderr_level);
                }

                if check && !output.success() {
                    return Err(context.fail(
                        FailureKind::Command,
                        StepError::NonZeroExit {
                            command: command_line(&cmd, &args),
                            code: output.exit_code,
                        },
                    ));
                }

                let result = lua_ctx.create_table()?;
                result.set("exit_code", output.exit_code)?;

                if capture_stdout {
                    result.set("stdout", output.stdout)?;
                }

                if capture_stderr {
                    result.set("stderr", output.stderr)?;
                }

                Ok(result)
            })?,
        )?;
    }

    lua.globals().set("process", process_table)?;
    Ok(())
}

/// Logs command output with the specified level
fn log_output(context: &Context, output: &str, level: &str) {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return;
    }

    let level = LogLevel::parse(level).unwrap_or_else(|| {
        warn!("Unknown log level '{}', defaulting to info", level);
        LogLevel::Info
    });

    context.log(level, trimmed);
}
