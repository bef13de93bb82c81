//! Errors raised by pipeline steps
//!
//! A step error is what a runner module reports when the work it was asked
//! to do did not happen. The module records it in the run context together
//! with a [`FailureKind`](sluice_core::domain::run::FailureKind) before
//! handing control back to Lua.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("'{command}' exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("failed to run '{command}': {reason}")]
    Launch { command: String, reason: String },

    #[error("path '{0}' is outside the workspace")]
    OutsideWorkspace(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl StepError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StepError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        StepError::Invalid(message.into())
    }

    /// Exit status the run should report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            StepError::NonZeroExit { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code() {
        let err = StepError::NonZeroExit {
            command: "make all".to_string(),
            code: 2,
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "'make all' exited with status 2");

        assert_eq!(StepError::invalid("bad").exit_code(), 1);
        assert_eq!(
            StepError::OutsideWorkspace("../x".to_string()).to_string(),
            "path '../x' is outside the workspace"
        );
    }
}
