//! Error types for data loading and lookups

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IatiError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {what}: {reason}")]
    Shape { what: String, reason: String },
}

pub type Result<T> = std::result::Result<T, IatiError>;

/// Reads and deserializes a JSON file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| IatiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| IatiError::Json {
        path: path.to_path_buf(),
        source,
    })
}
