//! Lua modules shared between the runner and the CLI
//!
//! A module owns one global table. The runner installs modules into the
//! pipeline sandbox before stages run; the CLI only asks them for editor
//! stubs.

use mlua::prelude::*;

/// Globals owned by the sandbox itself; no module may take these names
pub const RESERVED_GLOBALS: &[&str] = &[
    "pipeline",
    "string",
    "table",
    "math",
    "coroutine",
    "_G",
    "_VERSION",
];

/// A Lua module exposed to pipeline scripts under the global `id()`
///
/// ```rust
/// use mlua::prelude::*;
/// use sluice_lua::SluiceModule;
///
/// struct Site;
///
/// impl SluiceModule for Site {
///     fn id(&self) -> &'static str {
///         "site"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("name", "activity-explorer")?;
///         lua.globals().set(self.id(), table)
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\nsite = {}\n".to_string()
///     }
/// }
/// ```
pub trait SluiceModule: Send + Sync {
    /// Global name; a lowercase Lua identifier
    fn id(&self) -> &'static str;

    /// Defines the module's global table
    ///
    /// # Arguments
    /// * `lua` - The sandbox the module is installed into
    ///
    /// # Errors
    /// Returns the Lua error raised while building the table
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// Lua Language Server definitions, starting with `---@meta`
    fn stubs(&self) -> String;

    /// One line describing the module, written above its stubs
    fn summary(&self) -> &'static str {
        ""
    }
}

/// Ordered set of modules with unique ids
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn SluiceModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module
    ///
    /// # Panics
    /// If the id is already taken or names a sandbox global.
    pub fn register<M: SluiceModule + 'static>(&mut self, module: M) {
        let id = module.id();
        if RESERVED_GLOBALS.contains(&id) {
            panic!("Module id '{}' is reserved by the sandbox", id);
        }
        if self.contains(id) {
            panic!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
    }

    /// Chaining form of [`ModuleRegistry::register`]
    pub fn with<M: SluiceModule + 'static>(mut self, module: M) -> Self {
        self.register(module);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.iter().any(|m| m.id() == id)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.id()).collect()
    }

    /// Registers every module into `lua`, in insertion order
    ///
    /// Fails on the first module that errors or that leaves its global
    /// undefined.
    pub fn install(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;

            if !matches!(lua.globals().get::<LuaValue>(module.id())?, LuaValue::Table(_)) {
                return Err(LuaError::RuntimeError(format!(
                    "module '{}' did not define its global table",
                    module.id()
                )));
            }
        }
        Ok(())
    }

    /// Stub files as `(id, content)` pairs, headed by each module's summary
    pub fn stub_files(&self) -> Vec<(&'static str, String)> {
        self.modules
            .iter()
            .map(|m| {
                let stubs = m.stubs();
                let summary = m.summary();
                if summary.is_empty() {
                    return (m.id(), stubs);
                }
                let content = match stubs.strip_prefix("---@meta\n") {
                    Some(body) => format!("---@meta\n-- {}\n{}", summary, body),
                    None => format!("-- {}\n{}", summary, stubs),
                };
                (m.id(), content)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(&'static str);

    impl SluiceModule for Counter {
        fn id(&self) -> &'static str {
            self.0
        }

        fn register(&self, lua: &Lua) -> LuaResult<()> {
            let table = lua.create_table()?;
            table.set("value", 42)?;
            lua.globals().set(self.id(), table)
        }

        fn stubs(&self) -> String {
            format!("---@meta\n{} = {{}}\n", self.0)
        }

        fn summary(&self) -> &'static str {
            "Counts things"
        }
    }

    /// Registers nothing
    struct Forgetful;

    impl SluiceModule for Forgetful {
        fn id(&self) -> &'static str {
            "forgetful"
        }

        fn register(&self, _lua: &Lua) -> LuaResult<()> {
            Ok(())
        }

        fn stubs(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn test_install_in_order() {
        let registry = ModuleRegistry::new()
            .with(Counter("first"))
            .with(Counter("second"));

        assert!(registry.contains("first"));
        assert!(!registry.contains("third"));
        assert_eq!(registry.ids(), vec!["first", "second"]);

        let lua = Lua::new();
        registry.install(&lua).unwrap();
        let value: i32 = lua.load("return first.value + second.value").eval().unwrap();
        assert_eq!(value, 84);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_id() {
        ModuleRegistry::new().with(Counter("c")).with(Counter("c"));
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn test_reserved_id() {
        ModuleRegistry::new().with(Counter("pipeline"));
    }

    #[test]
    fn test_install_requires_global() {
        let registry = ModuleRegistry::new().with(Forgetful);
        let err = registry.install(&Lua::new()).unwrap_err();
        assert!(err.to_string().contains("forgetful"));
    }

    #[test]
    fn test_stub_files_carry_summary() {
        let registry = ModuleRegistry::new().with(Counter("c"));

        let stubs = registry.stub_files();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].0, "c");
        assert_eq!(stubs[0].1, "---@meta\n-- Counts things\nc = {}\n");
    }
}
