//! Data Transfer Objects
//!
//! Lightweight views of domain entities used for listings and reports.

pub mod run;
