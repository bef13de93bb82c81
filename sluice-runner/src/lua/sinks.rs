//! Concrete implementations of LogSink and VarProvider for the runner
//!
//! These connect the `log` and `env` modules from sluice-lua to the run
//! context, so script logs land in the run log with their stage attached.

use sluice_core::domain::log::LogLevel;
use sluice_lua::{LogSink, VarProvider};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;

/// Log sink that writes into the run context
pub struct ContextLogSink {
    context: Arc<Context>,
}

impl ContextLogSink {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }
}

impl LogSink for ContextLogSink {
    fn write(&self, level: LogLevel, message: &str) {
        self.context.log(level, message);
    }
}

/// Variable provider over the run variables
pub struct RunVarProvider {
    vars: HashMap<String, String>,
}

impl RunVarProvider {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl VarProvider for RunVarProvider {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LogBufferService;
    use crate::testing;

    #[test]
    fn test_context_log_sink_tags_stage() {
        let (_dir, context, logs) = testing::context();
        let sink = ContextLogSink::new(context.clone());

        context.enter_stage("checkout");
        sink.write(LogLevel::Info, "cloning");

        let entries = logs.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stage.as_deref(), Some("checkout"));
        assert_eq!(entries[0].message, "cloning");
    }

    #[test]
    fn test_run_var_provider() {
        let provider = RunVarProvider::new(HashMap::from([(
            "SLUICE_TRIGGER".to_string(),
            "schedule".to_string(),
        )]));
        assert_eq!(provider.get("SLUICE_TRIGGER").as_deref(), Some("schedule"));
        assert_eq!(provider.keys(), vec!["SLUICE_TRIGGER"]);
        assert!(provider.get("GITHUB_TOKEN").is_none());
    }
}
