//! Sluice Runner
//!
//! Executes pipeline runs in sandboxed Lua environments on the local machine.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Context: per-run state shared with the Lua modules
//! - Lua: executor, sinks and the runner-side modules (process, git, make, publish, ...)
//! - Services: execution, capability preflight, log buffering
//! - Repository: file-backed run records and logs
//! - Scheduler: cron ticks and branch watching

pub mod config;
pub mod context;
pub mod error;
pub mod lua;
pub mod podman;
pub mod process;
pub mod repository;
pub mod scheduler;
pub mod secrets;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
