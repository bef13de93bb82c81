//! Log buffer service
//!
//! Collects run log entries in memory while a run executes. The buffer is
//! drained periodically by the log flusher and once more when the run ends.

use sluice_core::domain::log::LogEntry;
use std::sync::{Arc, Mutex, PoisonError};

/// Service for managing log buffers
pub trait LogBufferService: Send + Sync {
    /// Adds a log entry to the buffer
    fn add_entry(&self, entry: LogEntry);

    /// Returns all buffered entries and clears the buffer
    fn drain(&self) -> Vec<LogEntry>;
}

/// In-memory implementation of LogBufferService
#[derive(Clone, Default)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBufferService for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogEntry) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn drain(&self) -> Vec<LogEntry> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::log::LogLevel;

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = InMemoryLogBuffer::new();
        buffer.add_entry(LogEntry::new(LogLevel::Info, None, "one"));
        buffer.add_entry(LogEntry::new(LogLevel::Error, Some("build".into()), "two"));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].stage.as_deref(), Some("build"));
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = InMemoryLogBuffer::new();
        let writer = buffer.clone();
        writer.add_entry(LogEntry::new(LogLevel::Debug, None, "shared"));
        assert_eq!(buffer.drain().len(), 1);
    }
}
