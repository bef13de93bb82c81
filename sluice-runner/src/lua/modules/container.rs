//! Container module: runs part of a stage inside a podman container
//!
//! `container.run(image, fn)` makes a container of `image` current for the
//! duration of `fn`, so every `process`, `make` and `deps` call inside it is
//! executed there. Calls nest; leaving `fn` (normally or by error) restores
//! the previous container, or the host.

use mlua::prelude::*;
use sluice_core::domain::run::FailureKind;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::StepError;

pub const STUBS: &str = r#"---@meta

---Container execution context module
---@class container
container = {}

---Run a function with commands executed inside a container of the given image
---The workspace is mounted at /workspace; the function's results are returned
---@param image string Container image (e.g. "python:3.9")
---@param fn fun(): ...
---@return ...
function container.run(image, fn) end

---Name of the container commands currently run in, or nil on the host
---@return string?
function container.current() end
"#;

/// Calls `body` with the container for `image` on top of the stack
///
/// A container that cannot be started is a setup failure; `body` is not
/// called in that case.
pub(crate) fn with_container<R>(
    context: &Context,
    image: &str,
    body: impl FnOnce() -> LuaResult<R>,
) -> LuaResult<R> {
    let name = context
        .container_manager
        .push_container(image)
        .map_err(|e| {
            context.fail(
                FailureKind::Setup,
                StepError::invalid(format!("failed to start container for {}: {:#}", image, e)),
            )
        })?;

    context.log_debug(format!("Entered container {} ({})", name, image));
    let result = body();

    match context.container_manager.pop_container() {
        Some(popped) if popped == name => debug!("Left container {}", name),
        other => warn!("Container stack out of order: expected {}, popped {:?}", name, other),
    }

    result
}

pub fn register_container_module(lua: &Lua, context: Arc<Context>) -> LuaResult<()> {
    let container_table = lua.create_table()?;

    {
        let context = context.clone();
        container_table.set(
            "run",
            lua.create_function(move |_, (image, func): (String, LuaFunction)| {
                if image.trim().is_empty() {
                    return Err(context.fail(
                        FailureKind::Setup,
                        StepError::invalid("container.run requires an image"),
                    ));
                }
                with_container(&context, &image, || func.call::<LuaMultiValue>(()))
            })?,
        )?;
    }

    {
        let context = context.clone();
        container_table.set(
            "current",
            lua.create_function(move |_, ()| Ok(context.container_manager.current_container()))?,
        )?;
    }

    lua.globals().set("container", container_table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_current_is_nil_on_host() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        let current: Option<String> = lua.load("return container.current()").eval().unwrap();
        assert!(current.is_none());
    }

    #[test]
    fn test_unstartable_image_is_setup_failure() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        let result = lua
            .load(
                r#"
                called = false
                container.run("Not A Valid Image!!", function() called = true end)
            "#,
            )
            .exec();

        assert!(result.is_err());
        let called: bool = lua.globals().get("called").unwrap();
        assert!(!called);
        assert_eq!(context.take_failure().unwrap().kind, FailureKind::Setup);
        assert!(context.container_manager.current_container().is_none());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let (_dir, context, _logs) = testing::context();
        let lua = testing::lua(&context);

        let result = lua.load(r#"container.run("  ", function() end)"#).exec();

        assert!(result.is_err());
        let failure = context.take_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Setup);
        assert!(failure.message.contains("requires an image"));
    }
}
