//! Lua execution infrastructure for the Sluice runner
//!
//! This module provides:
//! - The stage executor
//! - Runner-side modules (process, container, fs, git, runtime, deps, make, publish)
//! - Sinks connecting the `log` and `env` modules to the run context

pub mod executor;
pub mod modules;
pub mod sinks;
