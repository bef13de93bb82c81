//! Environment module for accessing run variables
//!
//! Stage scripts read run variables (trigger kind, branch, run id, output
//! directory, values passed with `--var`) through the `env` global. Secrets
//! are deliberately not reachable from here.

use crate::module::SluiceModule;
use mlua::prelude::*;
use std::sync::Arc;

/// Trait for providing run variables
///
/// # Thread Safety
/// Implementations must be Send + Sync to work with Lua's threading model.
pub trait VarProvider: Send + Sync {
    /// Get a variable by name
    ///
    /// # Arguments
    /// * `name` - Variable name, e.g. `SLUICE_TRIGGER`
    ///
    /// # Returns
    /// The value, or None when the variable is not set for this run
    fn get(&self, name: &str) -> Option<String>;

    /// All available variable names
    ///
    /// # Returns
    /// Names in no particular order; `env.keys()` sorts them for scripts
    fn keys(&self) -> Vec<String>;
}

/// Environment module for accessing run variables
pub struct EnvModule<V: VarProvider> {
    provider: Arc<V>,
}

impl<V: VarProvider> EnvModule<V> {
    /// Creates a new EnvModule over the provided variables
    ///
    /// # Arguments
    /// * `provider` - Implementation of VarProvider trait
    pub fn new(provider: V) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<V: VarProvider + 'static> SluiceModule for EnvModule<V> {
    fn id(&self) -> &'static str {
        "env"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env_table = lua.create_table()?;

        // env.get(name, default?)
        {
            let provider = self.provider.clone();
            env_table.set(
                "get",
                lua.create_function(move |_, (name, default): (String, Option<String>)| {
                    Ok(provider.get(&name).or(default))
                })?,
            )?;
        }

        // env.require(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "require",
                lua.create_function(move |_, name: String| {
                    provider.get(&name).ok_or_else(|| {
                        LuaError::RuntimeError(format!(
                            "Required variable '{}' is not set",
                            name
                        ))
                    })
                })?,
            )?;
        }

        // env.has(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "has",
                lua.create_function(move |_, name: String| Ok(provider.get(&name).is_some()))?,
            )?;
        }

        // env.all()
        {
            let provider = self.provider.clone();
            env_table.set(
                "all",
                lua.create_function(move |lua, ()| {
                    let table = lua.create_table()?;
                    for key in provider.keys() {
                        if let Some(value) = provider.get(&key) {
                            table.set(key, value)?;
                        }
                    }
                    Ok(table)
                })?,
            )?;
        }

        // env.keys()
        {
            let provider = self.provider.clone();
            env_table.set(
                "keys",
                lua.create_function(move |lua, ()| {
                    let mut keys = provider.keys();
                    keys.sort();
                    lua.create_sequence_from(keys)
                })?,
            )?;
        }

        lua.globals().set(self.id(), env_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Run variable access module
---Exposes SLUICE_RUN_ID, SLUICE_TRIGGER, SLUICE_BRANCH, SLUICE_OUTPUT_DIR
---and any value passed with `sluice run --var KEY=VALUE`
---@class env
env = {}

---Get a variable with an optional default value
---@param name string The name of the variable
---@param default? string The value to return if the variable is not set
---@return string? value
function env.get(name, default) end

---Get a required variable, raising an error if it is not set
---@param name string The name of the variable
---@return string value
function env.require(name) end

---Check if a variable exists
---@param name string The name of the variable
---@return boolean exists
function env.has(name) end

---Get all variables as a table
---@return table<string, string> vars
function env.all() end

---Get all variable names, sorted
---@return string[] keys
function env.keys() end
"#
        .to_string()
    }

    fn summary(&self) -> &'static str {
        "Run variables (trigger, branch, output directory, --var values)"
    }
}
