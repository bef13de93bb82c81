//! Core Sluice modules for Lua scripts
//!
//! Trait-based modules whose behaviour is supplied by the caller:
//! - Runner: run log buffer and run variables
//! - CLI: no-op implementations for stub generation

pub mod env;
pub mod log;

pub use env::{EnvModule, VarProvider};
pub use log::{LogModule, LogSink};
