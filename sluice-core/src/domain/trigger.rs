//! Trigger domain types
//!
//! A trigger event is the external stimulus that starts a run. Pipelines
//! declare which events they accept through a [`TriggerConfig`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::cron::CronSchedule;

/// The event that started a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// New commits were pushed to a branch
    Push { branch: String },
    /// A cron tick fired
    Schedule { tick: DateTime<Utc> },
}

impl TriggerEvent {
    pub fn push(branch: impl Into<String>) -> Self {
        TriggerEvent::Push {
            branch: branch.into(),
        }
    }

    pub fn schedule(tick: DateTime<Utc>) -> Self {
        TriggerEvent::Schedule { tick }
    }

    /// Short name of the event kind (`push` or `schedule`)
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::Push { .. } => "push",
            TriggerEvent::Schedule { .. } => "schedule",
        }
    }

    /// Branch name for push events
    pub fn branch(&self) -> Option<&str> {
        match self {
            TriggerEvent::Push { branch } => Some(branch),
            TriggerEvent::Schedule { .. } => None,
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Push { branch } => write!(f, "push to {}", branch),
            TriggerEvent::Schedule { tick } => write!(f, "schedule at {}", tick.to_rfc3339()),
        }
    }
}

/// Trigger declarations of a pipeline (`on = { push = ..., schedule = ... }`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Branches whose pushes start a run
    pub push_branches: Vec<String>,
    /// Cron schedule for periodic runs
    pub schedule: Option<CronSchedule>,
}

impl TriggerConfig {
    /// Returns true if the pipeline should run for this event
    pub fn accepts(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Push { branch } => self.push_branches.iter().any(|b| b == branch),
            TriggerEvent::Schedule { .. } => self.schedule.is_some(),
        }
    }

    /// True when no trigger is declared at all
    pub fn is_empty(&self) -> bool {
        self.push_branches.is_empty() && self.schedule.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TriggerConfig {
        TriggerConfig {
            push_branches: vec!["main".to_string()],
            schedule: Some(CronSchedule::parse("0 6 * * *").unwrap()),
        }
    }

    #[test]
    fn test_accepts_push_to_listed_branch_only() {
        let config = config();
        assert!(config.accepts(&TriggerEvent::push("main")));
        assert!(!config.accepts(&TriggerEvent::push("feature/x")));
    }

    #[test]
    fn test_accepts_schedule_only_when_configured() {
        let tick = chrono::Utc::now();
        assert!(config().accepts(&TriggerEvent::schedule(tick)));

        let push_only = TriggerConfig {
            push_branches: vec!["main".to_string()],
            schedule: None,
        };
        assert!(!push_only.accepts(&TriggerEvent::schedule(tick)));
        assert!(!push_only.is_empty());
        assert!(TriggerConfig::default().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = TriggerEvent::push("main");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "push");
        assert_eq!(json["branch"], "main");

        let back: TriggerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "push");
        assert_eq!(back.branch(), Some("main"));
    }
}
