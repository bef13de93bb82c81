//! Logging module for Sluice Lua scripts
//!
//! The `log` global lets stage scripts write into the run log. Where the
//! entries end up is decided by the [`LogSink`] the caller provides.
//! Like `print`, every function takes any number of values and joins them
//! with spaces, so `log.info("built", 12, "files")` works without `..`.

use crate::module::SluiceModule;
use mlua::prelude::*;
use sluice_core::domain::log::LogLevel;
use std::sync::Arc;

/// Destination for script log messages
///
/// # Thread Safety
/// Implementations must be Send + Sync; one sink is shared by every level
/// function and may be called from the blocking task running the stages.
pub trait LogSink: Send + Sync {
    /// Write a log message
    ///
    /// # Arguments
    /// * `level` - The log level (Debug, Info, Warning, Error)
    /// * `message` - The message, already joined from the script's values
    fn write(&self, level: LogLevel, message: &str);
}

pub struct LogModule<S: LogSink> {
    sink: Arc<S>,
}

impl<S: LogSink> LogModule<S> {
    /// Creates a new LogModule with the provided sink
    ///
    /// # Arguments
    /// * `sink` - Implementation of LogSink trait
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

/// Joins values the way `print` would display them
fn join_values(values: LuaMultiValue) -> LuaResult<String> {
    let parts = values
        .iter()
        .map(|value| match value {
            LuaValue::String(s) => Ok(s.to_string_lossy()),
            other => other.to_string(),
        })
        .collect::<LuaResult<Vec<String>>>()?;
    Ok(parts.join(" "))
}

const LEVELS: [(&str, LogLevel); 4] = [
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warning", LogLevel::Warning),
    ("error", LogLevel::Error),
];

impl<S: LogSink + 'static> SluiceModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in LEVELS {
            let sink = Arc::clone(&self.sink);
            log_table.set(
                name,
                lua.create_function(move |_, values: LuaMultiValue| {
                    sink.write(level, &join_values(values)?);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)
    }

    fn stubs(&self) -> String {
        let mut stubs = String::from("---@meta\n\n---@class log\nlog = {}\n");
        for (name, _) in LEVELS {
            stubs.push_str(&format!(
                "\n---Write a {name} entry to the run log\n---@param ... any Values joined with spaces\nfunction log.{name}(...) end\n"
            ));
        }
        stubs
    }

    fn summary(&self) -> &'static str {
        "Run log for the current stage"
    }
}
