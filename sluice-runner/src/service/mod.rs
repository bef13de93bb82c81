//! Service layer
//!
//! Services contain the business logic of the runner: executing runs,
//! checking that the machine provides what a pipeline requires, and
//! buffering logs while a run is in progress.
//!
//! All services are trait-based to enable testing and dependency injection.

mod capabilities;
mod execution;
mod log_buffer;

// Re-export traits
pub use capabilities::CapabilitiesService;
pub use execution::ExecutionService;
pub use log_buffer::LogBufferService;

// Re-export implementations
pub use capabilities::StandardCapabilitiesService;
pub use execution::{RunRequest, StandardExecutionService, run_vars};
pub use log_buffer::InMemoryLogBuffer;
