//! Scheduler layer for the runner
//!
//! This layer watches for trigger events (cron ticks and new commits on
//! watched branches) and hands them to the execution service one run at
//! a time.

pub mod poller;

pub use poller::{SchedulerState, TriggerPoller, parse_ls_remote};
