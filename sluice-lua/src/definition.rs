//! Pipeline definition for runtime execution
//!
//! Unlike [`PipelineMetadata`] (which is serializable), a
//! [`PipelineDefinition`] holds references to the Lua functions of each
//! stage and only lives as long as the Lua state that evaluated it.

use anyhow::{Context, Result};
use mlua::{Function, Lua, Table, Value};
use sluice_core::domain::pipeline::PipelineMetadata;

use crate::parser::metadata_from_table;

/// Full pipeline definition with executable Lua functions
pub struct PipelineDefinition {
    pub metadata: PipelineMetadata,
    pub stages: Vec<StageDefinition>,
}

/// Stage definition with executable Lua functions
pub struct StageDefinition {
    pub name: String,
    pub container: Option<String>,
    pub condition: Option<Function>,
    pub script: Function,
}

/// Parse a pipeline definition from Lua source code in an execution sandbox
///
/// The sandbox should already have the runner modules registered so that
/// definition-time code (e.g. `env.get`) resolves.
///
/// # Errors
/// Returns the same errors as [`crate::parse_pipeline_metadata`].
pub fn parse_pipeline_definition(lua: &Lua, source: &str) -> Result<PipelineDefinition> {
    let pipeline: Table = lua
        .load(source)
        .set_name("pipeline")
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    let metadata = metadata_from_table(&pipeline)?;

    let stages_table: Table = pipeline.get("stages")?;
    let mut stages = Vec::with_capacity(metadata.stages.len());

    for (stage_meta, pair) in metadata
        .stages
        .iter()
        .zip(stages_table.sequence_values::<Table>())
    {
        let stage_table = pair.context("Failed to read stage entry")?;

        let script: Function = stage_table.get("script").with_context(|| {
            format!("Stage '{}' must have a 'script' function", stage_meta.name)
        })?;

        let condition = match stage_table.get::<Value>("condition")? {
            Value::Function(condition) => Some(condition),
            _ => None,
        };

        stages.push(StageDefinition {
            name: stage_meta.name.clone(),
            container: stage_meta.container.clone(),
            condition,
            script,
        });
    }

    Ok(PipelineDefinition { metadata, stages })
}
