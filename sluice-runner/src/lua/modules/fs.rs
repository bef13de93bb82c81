//! Filesystem module: directory preparation inside the workspace

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;

use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Workspace filesystem module
---All paths are relative to the workspace and may not leave it
---@class fs
fs = {}

---Create a directory and its parents; succeeds if it already exists
---@param path string
function fs.mkdir(path) end

---Check whether a path exists
---@param path string
---@return boolean
function fs.exists(path) end

---Remove a file or directory tree
---@param path string
---@return boolean removed False when nothing existed
function fs.remove(path) end
"#;

pub fn register_fs_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let fs_table = lua.create_table()?;

    {
        let context = context.clone();
        fs_table.set(
            "mkdir",
            lua.create_function(move |_, path: String| {
                let target = context
                    .resolve_path(&path)
                    .map_err(|e| context.fail(FailureKind::Filesystem, e))?;

                std::fs::create_dir_all(&target).map_err(|e| {
                    context.fail(
                        FailureKind::Filesystem,
                        StepError::io(format!("failed to create directory '{}'", path), e),
                    )
                })?;

                context.log_debug(format!("Directory '{}' ready", path));
                Ok(())
            })?,
        )?;
    }

    {
        let context = context.clone();
        fs_table.set(
            "exists",
            lua.create_function(move |_, path: String| {
                let target = context
                    .resolve_path(&path)
                    .map_err(|e| context.fail(FailureKind::Filesystem, e))?;
                Ok(target.exists())
            })?,
        )?;
    }

    {
        let context = context.clone();
        fs_table.set(
            "remove",
            lua.create_function(move |_, path: String| {
                let target = context
                    .resolve_path(&path)
                    .map_err(|e| context.fail(FailureKind::Filesystem, e))?;

                if target == context.workspace() {
                    return Err(context.fail(
                        FailureKind::Filesystem,
                        StepError::invalid("refusing to remove the workspace itself"),
                    ));
                }

                let result = match std::fs::symlink_metadata(&target) {
                    Err(_) => return Ok(false),
                    Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&target),
                    Ok(_) => std::fs::remove_file(&target),
                };

                result.map_err(|e| {
                    context.fail(
                        FailureKind::Filesystem,
                        StepError::io(format!("failed to remove '{}'", path), e),
                    )
                })?;

                Ok(true)
            })?,
        )?;
    }

    lua.globals().set("fs", fs_table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing;
    use sluice_core::domain::run::FailureKind;

    #[test]
    fn test_mkdir_is_idempotent() {
        let (dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        lua.load(r#"fs.mkdir("output"); fs.mkdir("output"); fs.mkdir("output/nested/deep")"#)
            .exec()
            .unwrap();

        assert!(dir.path().join("output/nested/deep").is_dir());
        assert!(context.take_failure().is_none());
    }

    #[test]
    fn test_mkdir_keeps_existing_content() {
        let (dir, context, _logs) = testing::context();
        std::fs::create_dir(dir.path().join("output")).unwrap();
        std::fs::write(dir.path().join("output/index.html"), "<html>").unwrap();
        let lua = testing::lua(&context);

        lua.load(r#"fs.mkdir("output")"#).exec().unwrap();
        assert!(dir.path().join("output/index.html").exists());
    }

    #[test]
    fn test_exists_and_remove() {
        let (dir, context, _logs) = testing::context();
        std::fs::create_dir_all(dir.path().join("tmp/a")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let lua = testing::lua(&context);

        let result: (bool, bool, bool, bool, bool) = lua
            .load(
                r#"
                return fs.exists("tmp"), fs.remove("tmp"), fs.exists("tmp"),
                       fs.remove("file.txt"), fs.remove("missing")
            "#,
            )
            .eval()
            .unwrap();
        assert_eq!(result, (true, true, false, true, false));
        assert!(!dir.path().join("file.txt").exists());
    }

    #[test]
    fn test_paths_outside_workspace_fail() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        assert!(lua.load(r#"fs.mkdir("../escape")"#).exec().is_err());
        assert_eq!(context.take_failure().unwrap().kind, FailureKind::Filesystem);

        assert!(lua.load(r#"fs.remove(".")"#).exec().is_err());
    }
}
