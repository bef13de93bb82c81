//! Module implementations for the runner
//!
//! These modules provide the Lua API pipeline stages use to do their work.
//! They live in the runner because they need the run context: the
//! workspace, the container stack, the secret store and the failure record.
//!
//! Every module records a failure kind in the context before raising a Lua
//! error, so the executor can report what went wrong without inspecting
//! error strings.

pub mod container;
pub mod deps;
pub mod fs;
pub mod git;
pub mod make;
pub mod process;
pub mod publish;
pub mod runtime;

use mlua::prelude::*;
use std::sync::Arc;

use crate::context::Context;

pub use container::register_container_module;
pub use deps::register_deps_module;
pub use fs::register_fs_module;
pub use git::register_git_module;
pub use make::register_make_module;
pub use process::register_process_module;
pub use publish::register_publish_module;
pub use runtime::register_runtime_module;

/// Registers every runner module into a Lua context
pub fn register_runner_modules(lua: &Lua, context: &Arc<Context>) -> LuaResult<()> {
    register_process_module(lua, Arc::clone(context))?;
    register_container_module(lua, Arc::clone(context))?;
    register_fs_module(lua, Arc::clone(context))?;
    register_git_module(lua, Arc::clone(context))?;
    register_runtime_module(lua, Arc::clone(context))?;
    register_deps_module(lua, Arc::clone(context))?;
    register_make_module(lua, Arc::clone(context))?;
    register_publish_module(lua, Arc::clone(context))?;
    Ok(())
}

/// Language server stubs of the runner modules as `(id, content)` pairs
pub fn stub_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("process", process::STUBS),
        ("container", container::STUBS),
        ("fs", fs::STUBS),
        ("git", git::STUBS),
        ("runtime", runtime::STUBS),
        ("deps", deps::STUBS),
        ("make", make::STUBS),
        ("publish", publish::STUBS),
    ]
}

/// Reads an optional Lua array of strings
pub(crate) fn string_list(table: Option<LuaTable>) -> LuaResult<Vec<String>> {
    match table {
        Some(table) => table.sequence_values::<String>().collect(),
        None => Ok(Vec::new()),
    }
}

/// Reads an optional Lua `{ KEY = "value" }` table, sorted by key
pub(crate) fn string_pairs(table: Option<LuaTable>) -> LuaResult<Vec<(String, String)>> {
    let mut pairs = match table {
        Some(table) => table.pairs::<String, String>().collect::<LuaResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    pairs.sort();
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_all_modules_registered() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        for (id, _) in stub_files() {
            let present: bool = lua
                .load(format!("return type({}) == 'table'", id))
                .eval()
                .unwrap();
            assert!(present, "{} should be registered", id);
        }
    }

    #[test]
    fn test_stubs_are_meta_files() {
        for (id, stub) in stub_files() {
            assert!(stub.starts_with("---@meta"), "{}", id);
            assert!(stub.contains(&format!("{} = {{}}", id)), "{}", id);
        }
    }

    #[test]
    fn test_string_helpers() {
        let lua = Lua::new();
        let list: LuaTable = lua.load(r#"return { "a", "b" }"#).eval().unwrap();
        assert_eq!(string_list(Some(list)).unwrap(), vec!["a", "b"]);
        assert!(string_list(None).unwrap().is_empty());

        let map: LuaTable = lua.load(r#"return { B = "2", A = "1" }"#).eval().unwrap();
        assert_eq!(
            string_pairs(Some(map)).unwrap(),
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string())
            ]
        );
    }
}
