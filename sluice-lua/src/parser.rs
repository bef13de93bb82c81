//! Pipeline metadata parser
//!
//! This module provides functionality to parse Lua pipeline definitions
//! and extract metadata (name, description, requires, triggers, output, stages)
//! without executing any stage scripts.

use anyhow::{Context, Result};
use mlua::{Table, Value};
use sluice_core::domain::cron::CronSchedule;
use sluice_core::domain::pipeline::{DEFAULT_OUTPUT_DIR, PipelineMetadata, StageMetadata};
use sluice_core::domain::trigger::TriggerConfig;
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::sandbox::create_sandbox;

/// Parse pipeline metadata from Lua source code
///
/// The definition is evaluated in a bare sandbox, so stage scripts are never
/// called and runner modules are not available at definition time.
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or does not return a table
/// - Required fields are missing (name, stages)
/// - The cron expression or output directory is invalid
/// - Stage names are missing or duplicated
///
/// # Example
/// ```no_run
/// use sluice_lua::parser::parse_pipeline_metadata;
///
/// let source = r#"
///     return {
///         name = "Site",
///         on = { push = { branches = { "main" } }, schedule = { cron = "0 6 * * *" } },
///         stages = {
///             { name = "build", script = function() end },
///             { name = "publish", script = function() end },
///         }
///     }
/// "#;
///
/// let metadata = parse_pipeline_metadata(source)?;
/// assert_eq!(metadata.name, "Site");
/// assert_eq!(metadata.output, "output");
/// assert_eq!(metadata.stages.len(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_pipeline_metadata(source: &str) -> Result<PipelineMetadata> {
    let lua = create_sandbox().context("Failed to create sandbox")?;

    let pipeline: Table = lua
        .load(source)
        .set_name("pipeline")
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    metadata_from_table(&pipeline)
}

/// Extract metadata from an already evaluated pipeline table
pub(crate) fn metadata_from_table(pipeline: &Table) -> Result<PipelineMetadata> {
    let name: String = pipeline
        .get("name")
        .context("Pipeline must have a 'name' field")?;

    let description: Option<String> = pipeline.get("description").ok();

    let requires = parse_requires(pipeline)?;
    let triggers = parse_triggers(pipeline)?;
    let output = parse_output(pipeline)?;
    let stages = parse_stages(pipeline)?;

    Ok(PipelineMetadata {
        name,
        description,
        requires,
        triggers,
        output,
        stages,
    })
}

fn string_array(value: Value, field: &str) -> Result<Vec<String>> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Table(table) => {
            let mut items = Vec::new();
            for pair in table.sequence_values::<String>() {
                items.push(pair.with_context(|| format!("Failed to read '{}' entry", field))?);
            }
            Ok(items)
        }
        _ => Err(anyhow::anyhow!(
            "Field '{}' must be an array of strings",
            field
        )),
    }
}

/// Parse the 'requires' field from pipeline table
fn parse_requires(pipeline: &Table) -> Result<Vec<String>> {
    string_array(pipeline.get("requires").unwrap_or(Value::Nil), "requires")
}

/// Parse the 'on' field: `{ push = { branches = {...} }, schedule = { cron = "..." } }`
fn parse_triggers(pipeline: &Table) -> Result<TriggerConfig> {
    let on = match pipeline.get::<Value>("on").unwrap_or(Value::Nil) {
        Value::Nil => return Ok(TriggerConfig::default()),
        Value::Table(on) => on,
        _ => return Err(anyhow::anyhow!("Field 'on' must be a table")),
    };

    let push_branches = match on.get::<Value>("push").unwrap_or(Value::Nil) {
        Value::Nil => Vec::new(),
        Value::Table(push) => string_array(
            push.get("branches").unwrap_or(Value::Nil),
            "on.push.branches",
        )?,
        _ => return Err(anyhow::anyhow!("Field 'on.push' must be a table")),
    };

    let cron: Option<String> = match on.get::<Value>("schedule").unwrap_or(Value::Nil) {
        Value::Nil => None,
        Value::String(cron) => Some(cron.to_str()?.to_string()),
        Value::Table(schedule) => Some(
            schedule
                .get("cron")
                .context("Field 'on.schedule' must have a 'cron' expression")?,
        ),
        _ => {
            return Err(anyhow::anyhow!(
                "Field 'on.schedule' must be a cron string or a table"
            ));
        }
    };

    let schedule = cron
        .map(|expr| {
            CronSchedule::parse(&expr)
                .with_context(|| format!("Invalid schedule expression '{}'", expr))
        })
        .transpose()?;

    Ok(TriggerConfig {
        push_branches,
        schedule,
    })
}

/// Parse the 'output' field; must stay inside the workspace
fn parse_output(pipeline: &Table) -> Result<String> {
    let output: String = match pipeline.get::<Value>("output").unwrap_or(Value::Nil) {
        Value::Nil => return Ok(DEFAULT_OUTPUT_DIR.to_string()),
        Value::String(output) => output.to_str()?.to_string(),
        _ => return Err(anyhow::anyhow!("Field 'output' must be a string")),
    };

    // The runner empties this directory between runs, so it can be neither
    // the workspace itself nor runner or git state
    let path = Path::new(&output);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    let first = path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name),
        _ => None,
    });
    let reserved = first.is_none_or(|name| name == ".git" || name == ".sluice");
    if output.trim().is_empty() || escapes || reserved {
        return Err(anyhow::anyhow!(
            "Field 'output' must be a relative path inside the workspace, got '{}'",
            output
        ));
    }

    Ok(output)
}

/// Parse the 'stages' field from pipeline table
fn parse_stages(pipeline: &Table) -> Result<Vec<StageMetadata>> {
    let stages_table: Table = pipeline
        .get("stages")
        .context("Pipeline must have a 'stages' field")?;

    let mut stages = Vec::new();
    let mut seen = HashSet::new();

    for pair in stages_table.sequence_values::<Table>() {
        let stage_table = pair.context("Failed to read stage entry")?;

        let name: String = stage_table
            .get("name")
            .context("Stage must have a 'name' field")?;

        if !seen.insert(name.clone()) {
            return Err(anyhow::anyhow!("Duplicate stage name '{}'", name));
        }

        if !matches!(stage_table.get::<Value>("script")?, Value::Function(_)) {
            return Err(anyhow::anyhow!(
                "Stage '{}' must have a 'script' function",
                name
            ));
        }

        let container: Option<String> = stage_table.get("container").ok();
        let conditional = matches!(stage_table.get::<Value>("condition")?, Value::Function(_));

        stages.push(StageMetadata {
            name,
            container,
            conditional,
        });
    }

    if stages.is_empty() {
        return Err(anyhow::anyhow!("Pipeline must have at least one stage"));
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::trigger::TriggerEvent;

    #[test]
    fn test_parse_minimal_pipeline() {
        let source = r#"
            return {
                name = "Minimal Pipeline",
                stages = {
                    { name = "stage1", script = function() end }
                }
            }
        "#;

        let metadata = parse_pipeline_metadata(source).unwrap();
        assert_eq!(metadata.name, "Minimal Pipeline");
        assert_eq!(metadata.description, None);
        assert!(metadata.requires.is_empty());
        assert!(metadata.triggers.is_empty());
        assert_eq!(metadata.output, "output");
        assert_eq!(metadata.stage_names(), vec!["stage1"]);
    }

    #[test]
    fn test_parse_full_pipeline() {
        let source = r#"
            return pipeline.define {
                name = "Full Pipeline",
                description = "A complete example",
                requires = {"git", "make"},
                on = {
                    push = { branches = { "main" } },
                    schedule = { cron = "0 6 * * *" },
                },
                output = "public",
                stages = {
                    pipeline.stage { name = "checkout", script = function() end },
                    pipeline.stage {
                        name = "build",
                        container = "python:3.9",
                        condition = function() return true end,
                        script = function() end,
                    },
                }
            }
        "#;

        let metadata = parse_pipeline_metadata(source).unwrap();
        assert_eq!(metadata.name, "Full Pipeline");
        assert_eq!(metadata.description, Some("A complete example".to_string()));
        assert_eq!(metadata.requires, vec!["git", "make"]);
        assert_eq!(metadata.output, "public");
        assert!(metadata.triggers.accepts(&TriggerEvent::push("main")));
        assert!(!metadata.triggers.accepts(&TriggerEvent::push("dev")));
        assert_eq!(
            metadata.triggers.schedule.as_ref().unwrap().expression(),
            "0 6 * * *"
        );
        assert_eq!(metadata.stages[0].container, None);
        assert!(!metadata.stages[0].conditional);
        assert_eq!(metadata.stages[1].container.as_deref(), Some("python:3.9"));
        assert!(metadata.stages[1].conditional);
    }

    #[test]
    fn test_parse_schedule_shorthand() {
        let source = r#"
            return {
                name = "Nightly",
                on = { schedule = "30 2 * * *" },
                stages = { { name = "s", script = function() end } }
            }
        "#;

        let metadata = parse_pipeline_metadata(source).unwrap();
        assert!(metadata.triggers.push_branches.is_empty());
        assert!(metadata.triggers.schedule.is_some());
    }

    #[test]
    fn test_parse_invalid_cron() {
        let source = r#"
            return {
                name = "Bad Cron",
                on = { schedule = { cron = "every day" } },
                stages = { { name = "s", script = function() end } }
            }
        "#;

        let err = parse_pipeline_metadata(source).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid schedule expression"));
    }

    #[test]
    fn test_parse_output_outside_workspace() {
        for output in ["../site", "/tmp/site", "", ".", "./", ".sluice/site", ".git"] {
            let source = format!(
                r#"return {{ name = "x", output = "{}", stages = {{ {{ name = "s", script = function() end }} }} }}"#,
                output
            );
            assert!(parse_pipeline_metadata(&source).is_err(), "{}", output);
        }
    }

    #[test]
    fn test_parse_pipeline_missing_name() {
        let source = r#"
            return {
                stages = {
                    { name = "stage1", script = function() end }
                }
            }
        "#;

        let result = parse_pipeline_metadata(source);
        assert!(result.unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_parse_pipeline_missing_stages() {
        let source = r#"return { name = "No Stages" }"#;

        let result = parse_pipeline_metadata(source);
        assert!(result.unwrap_err().to_string().contains("stages"));
    }

    #[test]
    fn test_parse_pipeline_empty_stages() {
        let source = r#"return { name = "Empty Stages", stages = {} }"#;

        let result = parse_pipeline_metadata(source);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("at least one stage")
        );
    }

    #[test]
    fn test_parse_duplicate_stage_names() {
        let source = r#"
            return {
                name = "Dupes",
                stages = {
                    { name = "build", script = function() end },
                    { name = "build", script = function() end },
                }
            }
        "#;

        let result = parse_pipeline_metadata(source);
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_parse_stage_without_script() {
        let source = r#"
            return { name = "No Script", stages = { { name = "build" } } }
        "#;

        let result = parse_pipeline_metadata(source);
        assert!(result.unwrap_err().to_string().contains("script"));
    }

    #[test]
    fn test_parse_invalid_lua() {
        assert!(parse_pipeline_metadata("this is not valid lua!!!").is_err());
        assert!(parse_pipeline_metadata(r#"return "not a table""#).is_err());
    }
}
