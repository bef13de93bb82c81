//! Repository layer
//!
//! Repositories persist run records and run logs. They hold no business
//! logic and are trait-based so services can be tested against other
//! storage.

mod runs;

pub use runs::{FileRunRepository, RepositoryError, RunRepository};
