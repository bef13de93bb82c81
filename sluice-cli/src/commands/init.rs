//! Init command handlers
//!
//! Generates a starter pipeline and the Lua development files
//! (.luarc.json and module stubs for editor completion).

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_core::domain::log::LogLevel;
use sluice_lua::{EnvModule, LogModule, LogSink, ModuleRegistry, VarProvider};
use std::fs;
use std::path::Path;

use crate::config::Config;

/// Init subcommands
#[derive(Subcommand)]
pub enum InitCommands {
    /// Write a pipeline that builds the site and publishes it
    Pipeline {
        /// Pipeline name
        #[arg(long, default_value = "site")]
        name: String,

        /// Branch whose pushes trigger a run
        #[arg(long, default_value = "main")]
        branch: String,

        /// Daily schedule (five-field cron, UTC)
        #[arg(long, default_value = "0 6 * * *")]
        cron: String,

        /// Python version prefix the build needs
        #[arg(long, default_value = "3.9")]
        python: String,

        /// Output directory that gets published
        #[arg(long, default_value = "output")]
        output: String,

        /// Hosting branch the output is pushed to
        #[arg(long, default_value = "gh-pages")]
        pages_branch: String,

        /// Overwrite an existing pipeline file
        #[arg(long)]
        force: bool,
    },
    /// Generate Lua development files (.luarc.json and stubs)
    Lua {
        /// Output directory for generated files
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Generate only .luarc.json
        #[arg(long)]
        config_only: bool,

        /// Generate only stub files
        #[arg(long)]
        stubs_only: bool,
    },
}

/// Values substituted into the pipeline template
struct PipelineTemplate {
    name: String,
    branch: String,
    cron: String,
    python: String,
    output: String,
    pages_branch: String,
}

const PIPELINE_TEMPLATE: &str = r#"-- Site pipeline
--
-- Runs on every push to {branch} and on a daily schedule: fetches the
-- sources, installs the Python dependencies, regenerates the data files and
-- publishes {output}/ to the {pages_branch} branch.

local branch = "{branch}"

return pipeline.define {
    name = "{name}",
    description = "Regenerate the data files and publish them",
    requires = { "git", "make", "python3" },
    on = {
        push = { branches = { branch } },
        schedule = { cron = "{cron}" },
    },
    output = "{output}",
    stages = {
        pipeline.stage {
            name = "checkout",
            script = function()
                local sha = git.checkout { ref = env.get("SLUICE_BRANCH", branch) }
                log.info("Checked out " .. sha)
            end,
        },
        pipeline.stage {
            name = "setup-runtime",
            script = function()
                local version = runtime.setup { tool = "python3", version = "{python}" }
                log.info("Using Python " .. version)
            end,
        },
        pipeline.stage {
            name = "install-deps",
            script = function()
                deps.pip { manifest = "requirements.txt" }
            end,
        },
        pipeline.stage {
            name = "prepare-output",
            script = function()
                fs.mkdir("{output}")
            end,
        },
        pipeline.stage {
            name = "force-download",
            script = function()
                make.run("force-download")
            end,
        },
        pipeline.stage {
            name = "build",
            script = function()
                make.run("all")
            end,
        },
        pipeline.stage {
            name = "publish",
            script = function()
                local commit = publish.pages { branch = "{pages_branch}", token = "GITHUB_TOKEN" }
                if commit then
                    log.info("Published " .. commit)
                end
            end,
        },
    },
}
"#;

const PIPELINE_STUBS: &str = r#"---@meta

---Pipeline definition helpers
---@class pipeline
pipeline = {}

---@class StageDefinition
---@field name string Unique stage name
---@field script fun() Stage body
---@field container? string Run the stage inside this container image
---@field condition? fun(): boolean Skip the stage when this returns false

---@class PipelineDefinition
---@field name string
---@field description? string
---@field requires? string[] Tools that must be on PATH
---@field on? { push?: { branches: string[] }, schedule?: { cron: string }|string }
---@field output? string Output directory (default: "output")
---@field stages StageDefinition[]

---@param definition PipelineDefinition
---@return PipelineDefinition
function pipeline.define(definition) end

---@param stage StageDefinition
---@return StageDefinition
function pipeline.stage(stage) end

---Fluent alternative to pipeline.define
function pipeline.builder() end
"#;

/// Globals the language server should accept
const LUA_GLOBALS: &[&str] = &[
    "pipeline",
    "log",
    "env",
    "process",
    "container",
    "fs",
    "git",
    "runtime",
    "deps",
    "make",
    "publish",
];

pub async fn handle_init_command(command: InitCommands, config: &Config) -> Result<i32> {
    match command {
        InitCommands::Pipeline {
            name,
            branch,
            cron,
            python,
            output,
            pages_branch,
            force,
        } => {
            let template = PipelineTemplate {
                name,
                branch,
                cron,
                python,
                output,
                pages_branch,
            };
            write_pipeline(&config.pipeline_path(), &template, force)?;
        }
        InitCommands::Lua {
            output,
            config_only,
            stubs_only,
        } => generate_lua_dev_files(Path::new(&output), config_only, stubs_only)?,
    }

    Ok(0)
}

fn render_pipeline(template: &PipelineTemplate) -> String {
    PIPELINE_TEMPLATE
        .replace("{name}", &template.name)
        .replace("{branch}", &template.branch)
        .replace("{cron}", &template.cron)
        .replace("{python}", &template.python)
        .replace("{output}", &template.output)
        .replace("{pages_branch}", &template.pages_branch)
}

fn write_pipeline(path: &Path, template: &PipelineTemplate, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let content = render_pipeline(template);
    sluice_lua::parse_pipeline_metadata(&content).context("Generated pipeline is invalid")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} {}", "✓ Created".green().bold(), path.display());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Check the stages and the cron schedule");
    println!("  2. Export the push credential as {}", "GITHUB_TOKEN".cyan());
    println!("  3. Try it with {}", "sluice run --dry-run".cyan());

    Ok(())
}

/// Generate Lua development files
fn generate_lua_dev_files(output_path: &Path, config_only: bool, stubs_only: bool) -> Result<()> {
    if !stubs_only {
        generate_luarc_json(output_path)?;
    }

    if !config_only {
        generate_stub_files(output_path)?;
    }

    println!("{}", "✓ Lua development files generated!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Install Lua Language Server in your editor");
    println!("  2. Open your pipeline script to see autocomplete and type hints");
    println!("  3. Use {} to check it", "sluice validate".cyan());

    Ok(())
}

/// Generate .luarc.json for Lua LSP configuration
fn generate_luarc_json(output_path: &Path) -> Result<()> {
    let luarc_path = output_path.join(".luarc.json");

    let luarc = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
        "runtime": { "version": "Lua 5.4" },
        "diagnostics": { "globals": LUA_GLOBALS },
        "workspace": { "library": [".sluice/stubs"], "checkThirdParty": false },
        "completion": { "callSnippet": "Both" }
    });

    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    fs::write(&luarc_path, format!("{}\n", serde_json::to_string_pretty(&luarc)?))
        .with_context(|| format!("Failed to write .luarc.json to {:?}", luarc_path))?;

    println!("  {} .luarc.json", "Created".green());

    Ok(())
}

/// All stub files as `(module id, content)` pairs
///
/// `log` and `env` come from the module implementations themselves so
/// they stay in sync with what scripts actually get.
fn stub_files() -> Vec<(&'static str, String)> {
    let registry = ModuleRegistry::new()
        .with(LogModule::new(NoOpLogSink))
        .with(EnvModule::new(NoOpVarProvider));

    let mut stubs = vec![("pipeline", PIPELINE_STUBS.to_string())];
    stubs.extend(registry.stub_files());
    stubs.extend(
        sluice_runner::lua::modules::stub_files()
            .into_iter()
            .map(|(id, content)| (id, content.to_string())),
    );
    stubs
}

/// Generate stub files for every module scripts can use
fn generate_stub_files(output_path: &Path) -> Result<()> {
    let stubs_dir = output_path.join(".sluice").join("stubs");
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    for (name, content) in stub_files() {
        let stub_path = stubs_dir.join(format!("{}.lua", name));

        fs::write(&stub_path, content)
            .with_context(|| format!("Failed to write stub file {:?}", stub_path))?;

        println!("  {} {}.lua", "Created".green(), name);
    }

    println!(
        "  {} in {}",
        "Stubs ready".green(),
        stubs_dir.display().to_string().cyan()
    );

    Ok(())
}

/// Log sink for stub generation; never written to
struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn write(&self, _level: LogLevel, _message: &str) {}
}

/// Variable provider for stub generation
struct NoOpVarProvider;

impl VarProvider for NoOpVarProvider {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}
