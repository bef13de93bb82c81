//! Runtime module: verifies the language runtime a pipeline was written for

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;

use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Language runtime provisioning module
---@class runtime
runtime = {}

---@class RuntimeOptions
---@field tool string Executable to check (e.g. "python3")
---@field version string Required version prefix (e.g. "3.9" accepts 3.9.18 but not 3.10)

---Ensure the runtime is available in the required version
---@param options RuntimeOptions
---@return string version The detected version
function runtime.setup(options) end
"#;

/// Extracts the first version number from `tool --version` output
///
/// Handles `Python 3.9.18`, `v18.19.0` and `go version go1.22.1 linux/amd64`.
pub fn parse_version(text: &str) -> Option<String> {
    text.split_whitespace().find_map(|token| {
        let token = token.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let version: String = token
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        Some(version.trim_end_matches('.').to_string())
    })
}

/// True if `detected` equals `required` or extends it with more components
pub fn version_matches(detected: &str, required: &str) -> bool {
    let required = required.trim().trim_start_matches('v');
    detected == required || detected.starts_with(&format!("{}.", required))
}

fn setup(context: &Context, tool: &str, required: &str) -> Result<String, StepError> {
    let output = context.exec(tool, &["--version".to_string()], None, &[])?;
    if !output.success() {
        return Err(StepError::NonZeroExit {
            command: format!("{} --version", tool),
            code: output.exit_code,
        });
    }

    // Some tools (python2, java) report on stderr
    let text = format!("{} {}", output.stdout, output.stderr);
    let detected = parse_version(&text)
        .ok_or_else(|| StepError::invalid(format!("could not determine the version of '{}'", tool)))?;

    if !version_matches(&detected, required) {
        return Err(StepError::invalid(format!(
            "{} {} does not satisfy required version {}",
            tool, detected, required
        )));
    }

    Ok(detected)
}

pub fn register_runtime_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let runtime_table = lua.create_table()?;

    {
        let context = context.clone();
        runtime_table.set(
            "setup",
            lua.create_function(move |_, options: LuaTable| {
                let tool: String = options.get("tool").map_err(|_| {
                    context.fail(
                        FailureKind::Runtime,
                        StepError::invalid("runtime.setup requires 'tool' field"),
                    )
                })?;
                let version: String = options.get("version").map_err(|_| {
                    context.fail(
                        FailureKind::Runtime,
                        StepError::invalid("runtime.setup requires 'version' field"),
                    )
                })?;

                let detected =
                    setup(&context, &tool, &version).map_err(|e| context.fail(FailureKind::Runtime, e))?;

                context.log_info(format!("Using {} {}", tool, detected));
                Ok(detected)
            })?,
        )?;
    }

    lua.globals().set("runtime", runtime_table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Python 3.9.18\n").as_deref(), Some("3.9.18"));
        assert_eq!(parse_version("v18.19.0").as_deref(), Some("18.19.0"));
        assert_eq!(
            parse_version("go version go1.22.1 linux/amd64").as_deref(),
            Some("1.22.1")
        );
        assert_eq!(parse_version("GNU Make 4.3.").as_deref(), Some("4.3"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_version_matches_by_component() {
        assert!(version_matches("3.9.18", "3.9"));
        assert!(version_matches("3.9", "3.9"));
        assert!(version_matches("3.9.18", "3"));
        assert!(!version_matches("3.10.1", "3.1"));
        assert!(!version_matches("3.8.10", "3.9"));
    }

    #[test]
    fn test_setup_accepts_matching_runtime() {
        let (dir, context, _logs) = testing::context();
        let python = testing::script(dir.path(), "python", "echo 'Python 3.9.18'");
        let lua = testing::lua(&context);

        let version: String = lua
            .load(format!(r#"return runtime.setup {{ tool = "{}", version = "3.9" }}"#, python))
            .eval()
            .unwrap();
        assert_eq!(version, "3.9.18");
    }

    #[test]
    fn test_setup_rejects_other_version() {
        let (dir, context, _logs) = testing::context();
        let python = testing::script(dir.path(), "python", "echo 'Python 3.11.2' >&2");
        let lua = testing::lua(&context);

        let err = lua
            .load(format!(r#"runtime.setup {{ tool = "{}", version = "3.9" }}"#, python))
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("does not satisfy"));
        assert_eq!(context.take_failure().unwrap().kind, FailureKind::Runtime);
    }

    #[test]
    fn test_setup_missing_tool() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        assert!(
            lua.load(r#"runtime.setup { tool = "sluice-missing-python", version = "3.9" }"#)
                .exec()
                .is_err()
        );
        assert_eq!(context.take_failure().unwrap().kind, FailureKind::Runtime);
    }
}
