//! Make module: invokes build targets

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;

use super::string_list;
use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Build target module
---@class make
make = {}

---@class MakeOptions
---@field dir? string Directory containing the Makefile, relative to the workspace
---@field args? string[] Extra arguments (e.g. { "-j4", "VERBOSE=1" })
---@field program? string Make implementation to use (default: "make")

---Run a make target; a non-zero exit fails the stage
---@param target string
---@param options? MakeOptions
function make.run(target, options) end
"#;

pub fn register_make_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let make_table = lua.create_table()?;

    {
        let context = context.clone();
        make_table.set(
            "run",
            lua.create_function(move |_, (target, options): (String, Option<LuaTable>)| {
                let (dir, extra, program) = match options {
                    Some(options) => (
                        options.get::<Option<String>>("dir")?,
                        string_list(options.get("args")?)?,
                        options.get::<Option<String>>("program")?,
                    ),
                    None => (None, Vec::new(), None),
                };
                let program = program.unwrap_or_else(|| "make".to_string());

                if target.trim().is_empty() {
                    return Err(context.fail(
                        FailureKind::Build,
                        StepError::invalid("make.run requires a target"),
                    ));
                }

                let mut args = vec![target.clone()];
                args.extend(extra);

                context.log_info(format!("Running {} {}", program, target));
                context
                    .exec_checked(&program, &args, dir.as_deref())
                    .map_err(|e| context.fail(FailureKind::Build, e))?;

                context.log_info(format!("Target '{}' finished", target));
                Ok(())
            })?,
        )?;
    }

    lua.globals().set("make", make_table)?;
    Ok(())
}
