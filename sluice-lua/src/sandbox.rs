//! Lua sandbox creation
//!
//! Pipelines are evaluated in a restricted Lua state without filesystem,
//! network, OS or module-loading access. Everything a stage may touch is
//! exposed through modules the caller registers afterwards.
//!
//! The `pipeline` helper module is always injected as it's needed for
//! parsing definitions.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Create a restricted Lua sandbox
///
/// This sandbox includes only basic Lua functionality (tables, strings, math, coroutines)
/// and does NOT include any I/O capabilities or the ability to load external code.
///
/// # Example
/// ```no_run
/// use sluice_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let pipeline: mlua::Table = lua
///     .load(r#"return pipeline.define { name = "site", stages = {} }"#)
///     .eval()?;
/// let name: String = pipeline.get("name")?;
/// assert_eq!(name, "site");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Explicitly exclude: IO, OS, PACKAGE, DEBUG
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_pipeline_module(&lua)?;

    Ok(lua)
}

/// Register the pipeline helper module
///
/// `pipeline.define` and `pipeline.stage` are passthroughs that exist for
/// readability and editor completion; `pipeline.builder()` offers a fluent
/// alternative to the table syntax.
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    pipeline.set(
        "define",
        lua.create_function(|_, definition: Table| Ok(definition))?,
    )?;
    pipeline.set("stage", lua.create_function(|_, stage: Table| Ok(stage))?)?;
    pipeline.set(
        "builder",
        lua.create_function(|lua, ()| create_pipeline_builder(lua))?,
    )?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}

/// Returns `table[key]`, creating an empty table there first if missing
fn child_table(lua: &Lua, table: &Table, key: &str) -> LuaResult<Table> {
    match table.get::<Value>(key)? {
        Value::Table(existing) => Ok(existing),
        _ => {
            let created = lua.create_table()?;
            table.set(key, created.clone())?;
            Ok(created)
        }
    }
}

fn append(table: &Table, value: impl mlua::IntoLua) -> LuaResult<()> {
    table.raw_set(table.raw_len() + 1, value)
}

/// Create a pipeline builder instance with fluent API methods
///
/// Every method returns the builder so calls can be chained with `:`.
fn create_pipeline_builder(lua: &Lua) -> LuaResult<Table> {
    let builder = lua.create_table()?;
    let metatable = lua.create_table()?;

    for field in ["name", "description", "output"] {
        metatable.set(
            field,
            lua.create_function(move |_, (builder, value): (Table, String)| {
                builder.set(format!("_{}", field), value)?;
                Ok(builder)
            })?,
        )?;
    }

    metatable.set(
        "requires",
        lua.create_function(|lua, (builder, tool): (Table, String)| {
            append(&child_table(lua, &builder, "_requires")?, tool)?;
            Ok(builder)
        })?,
    )?;

    metatable.set(
        "on_push",
        lua.create_function(|lua, (builder, branch): (Table, String)| {
            append(&child_table(lua, &builder, "_branches")?, branch)?;
            Ok(builder)
        })?,
    )?;

    metatable.set(
        "on_schedule",
        lua.create_function(|_, (builder, cron): (Table, String)| {
            builder.set("_cron", cron)?;
            Ok(builder)
        })?,
    )?;

    metatable.set(
        "stage",
        lua.create_function(|lua, (builder, stage): (Table, Table)| {
            append(&child_table(lua, &builder, "_stages")?, stage)?;
            Ok(builder)
        })?,
    )?;

    // build() converts the builder into a plain definition table
    metatable.set(
        "build",
        lua.create_function(|lua, builder: Table| {
            let definition = lua.create_table()?;

            for field in ["name", "description", "output"] {
                if let Value::String(value) = builder.get::<Value>(format!("_{}", field))? {
                    definition.set(field, value)?;
                }
            }
            if let Value::Table(requires) = builder.get::<Value>("_requires")? {
                definition.set("requires", requires)?;
            }

            let on = lua.create_table()?;
            if let Value::Table(branches) = builder.get::<Value>("_branches")? {
                let push = lua.create_table()?;
                push.set("branches", branches)?;
                on.set("push", push)?;
            }
            if let Value::String(cron) = builder.get::<Value>("_cron")? {
                let schedule = lua.create_table()?;
                schedule.set("cron", cron)?;
                on.set("schedule", schedule)?;
            }
            definition.set("on", on)?;

            definition.set("stages", child_table(lua, &builder, "_stages")?)?;

            Ok(definition)
        })?,
    )?;

    metatable.set("__index", metatable.clone())?;
    builder.set_metatable(Some(metatable))?;

    Ok(builder)
}
