//! Core domain types
//!
//! This module contains the core domain structures used across Sluice crates.
//! These types are shared between the Lua definition layer (parsing), the
//! runner (execution) and the CLI (reporting).

pub mod cron;
pub mod log;
pub mod pipeline;
pub mod run;
pub mod trigger;
