//! Lua executor
//!
//! Handles all Lua-related execution logic:
//! - Creating the execution sandbox with every module registered
//! - Parsing the pipeline into an executable definition
//! - Running stages in order, stopping at the first failure
//! - Recording stage transitions on the [`Run`]

use anyhow::{Context as AnyhowContext, Result};
use sluice_core::domain::run::{FailureKind, PublishedArtifact, Run, RunResult};
use sluice_lua::{
    EnvModule, LogModule, ModuleRegistry, PipelineDefinition, StageDefinition, create_sandbox,
    parse_pipeline_definition,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::lua::modules::container::with_container;
use crate::lua::modules::register_runner_modules;
use crate::lua::sinks::{ContextLogSink, RunVarProvider};

/// Outcome of a single stage
enum StageOutcome {
    Succeeded,
    Skipped,
    Failed(RunResult),
}

/// Lua executor
pub struct LuaExecutor {
    context: Arc<Context>,
}

impl LuaExecutor {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    /// Executes a pipeline from source code against a started run
    ///
    /// Stage records on `run` are updated as the stages progress; the run's
    /// own status is left for the caller to complete with the returned result.
    pub fn execute_pipeline(&self, run: &mut Run, pipeline_source: &str) -> RunResult {
        let lua = match self.create_sandbox() {
            Ok(lua) => lua,
            Err(e) => return self.log_and_fail("Failed to create execution sandbox", e),
        };

        let definition = match parse_pipeline_definition(&lua, pipeline_source) {
            Ok(def) => def,
            Err(e) => return self.log_and_fail("Failed to parse pipeline definition", e),
        };

        match self.run_stages(run, &definition) {
            Ok(result) => result,
            Err(e) => self.log_and_fail("Pipeline execution aborted", e),
        }
    }

    fn run_stages(&self, run: &mut Run, definition: &PipelineDefinition) -> Result<RunResult> {
        let expected: Vec<&str> = run.stages.iter().map(|s| s.name.as_str()).collect();
        if definition.metadata.stage_names() != expected {
            anyhow::bail!(
                "pipeline stages changed since the run was created: expected {:?}, found {:?}",
                expected,
                definition.metadata.stage_names()
            );
        }

        self.context.log_info(format!(
            "Starting pipeline: {} ({})",
            definition.metadata.name, run.trigger
        ));

        info!(
            "Executing pipeline '{}' with {} stages",
            definition.metadata.name,
            definition.stages.len()
        );

        if self
            .context
            .discard_output()
            .with_context(|| format!("Failed to reset output directory '{}'", run.output_dir))?
        {
            self.context
                .log_info(format!("Removed stale output directory '{}'", run.output_dir));
        }

        let total = definition.stages.len();
        for (idx, stage) in definition.stages.iter().enumerate() {
            info!("Executing stage {}/{}: {}", idx + 1, total, stage.name);

            run.begin_stage(idx)?;
            self.context.enter_stage(&stage.name);
            let outcome = self.execute_stage(stage);
            self.context.leave_stage();

            match outcome {
                StageOutcome::Succeeded => {
                    run.finish_stage(idx)?;
                }
                StageOutcome::Skipped => {
                    run.skip_stage(idx)?;
                }
                StageOutcome::Failed(result) => {
                    let message = result.error_message.clone().unwrap_or_default();
                    run.fail_stage(idx, message)?;
                    return Ok(result.with_published(self.context.published()));
                }
            }
        }

        info!("Run {} completed successfully", run.id);
        self.context.log_info("Pipeline completed successfully");

        let published = self.context.published();
        self.discard_published_output(published.as_ref());

        Ok(RunResult::success().with_published(published))
    }

    /// Removes the output directory once it has been pushed
    ///
    /// Dry runs keep it for inspection.
    fn discard_published_output(&self, published: Option<&PublishedArtifact>) {
        let pushed = published.is_some_and(|artifact| {
            artifact.commit.is_some()
                && Path::new(&artifact.source_dir) == Path::new(&self.context.output_dir)
        });
        if !pushed {
            return;
        }

        match self.context.discard_output() {
            Ok(_) => self.context.log_debug(format!(
                "Discarded published output directory '{}'",
                self.context.output_dir
            )),
            Err(e) => self
                .context
                .log_warning(format!("Failed to discard output directory: {}", e)),
        }
    }

    /// Creates the execution sandbox with the shared and runner modules
    fn create_sandbox(&self) -> Result<mlua::Lua> {
        let lua = create_sandbox().context("Failed to create base sandbox")?;

        ModuleRegistry::new()
            .with(LogModule::new(ContextLogSink::new(Arc::clone(&self.context))))
            .with(EnvModule::new(RunVarProvider::new(self.context.vars.clone())))
            .install(&lua)
            .context("Failed to register core modules")?;

        register_runner_modules(&lua, &self.context).context("Failed to register runner modules")?;

        Ok(lua)
    }

    fn execute_stage(&self, stage: &StageDefinition) -> StageOutcome {
        self.context
            .log_info(format!("Starting stage: {}", stage.name));

        if let Some(ref condition) = stage.condition {
            match condition.call::<bool>(()) {
                Ok(true) => {
                    debug!("Stage '{}' condition passed", stage.name);
                }
                Ok(false) => {
                    info!("Stage '{}' skipped (condition returned false)", stage.name);
                    self.context
                        .log_info(format!("Stage '{}' skipped (condition not met)", stage.name));
                    return StageOutcome::Skipped;
                }
                Err(e) => {
                    return self.stage_failed(stage, format!("condition failed: {}", e));
                }
            }
        }

        let result = match stage.container {
            Some(ref image) => with_container(&self.context, image, || stage.script.call::<()>(())),
            None => stage.script.call::<()>(()),
        }
        .map_err(|e| e.to_string());

        match result {
            Ok(()) => {
                self.context
                    .log_info(format!("Stage '{}' completed", stage.name));
                StageOutcome::Succeeded
            }
            Err(e) => self.stage_failed(stage, e),
        }
    }

    /// Builds the failed result for a stage from the recorded failure
    ///
    /// Errors raised by the script itself (no module recorded a failure)
    /// are reported as script errors.
    fn stage_failed(&self, stage: &StageDefinition, lua_error: String) -> StageOutcome {
        let (kind, message, exit_code) = match self.context.take_failure() {
            Some(failure) => (failure.kind, failure.message, failure.exit_code),
            None => (FailureKind::Script, lua_error, 1),
        };

        error!("Stage '{}' failed ({}): {}", stage.name, kind, message);
        self.context
            .log_error(format!("Stage '{}' failed: {}", stage.name, message));

        StageOutcome::Failed(RunResult::stage_failed(
            stage.name.clone(),
            kind,
            message,
            exit_code,
        ))
    }

    /// Logs an error and returns a failed RunResult
    fn log_and_fail(&self, message: &str, error: anyhow::Error) -> RunResult {
        let full_message = format!("{}: {:#}", message, error);
        error!("{}", full_message);
        self.context.log_error(full_message.clone());
        RunResult::failed(full_message)
    }
}
