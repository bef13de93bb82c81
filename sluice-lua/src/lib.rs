//! Sluice Lua Infrastructure
//!
//! This crate provides the Lua layer of the Sluice pipeline runner.
//! It includes:
//! - Module trait and registry for Lua modules
//! - The restricted sandbox pipelines are evaluated in
//! - Core module implementations (log, env)
//! - Pipeline parsing: serializable metadata and executable definitions

pub mod definition;
pub mod module;
pub mod modules;
pub mod parser;
pub mod sandbox;

pub use definition::{PipelineDefinition, StageDefinition, parse_pipeline_definition};
pub use module::{ModuleRegistry, RESERVED_GLOBALS, SluiceModule};
pub use modules::{EnvModule, LogModule, LogSink, VarProvider};
pub use parser::parse_pipeline_metadata;
pub use sandbox::create_sandbox;

pub use sluice_core::domain::pipeline::{PipelineMetadata, StageMetadata};
