//! Sluice Core
//!
//! Core types and abstractions for the Sluice pipeline runner.
//!
//! This crate contains:
//! - Domain types: Core entities (Pipeline, Run, Trigger, etc.)
//! - DTOs: Lightweight views used for listings and reports

pub mod domain;
pub mod dto;
