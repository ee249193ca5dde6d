//! Error types for post-build validation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::stage::ValidationStage;

#[derive(Debug, Error)]
pub enum ValidateError {
    /// A stage found a real difference between source and bundle (strict mode only).
    #[error("{stage} found discrepancies: {}", .details.join("; "))]
    Discrepancy {
        stage: ValidationStage,
        details: Vec<String>,
    },

    /// Creating or populating the sandbox failed.
    #[error("{message}: {}", .path.display())]
    Environment {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A required executable (node, a package manager) cannot be started.
    #[error("'{tool}' is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// A subprocess ran past its deadline and was killed.
    #[error("'{command}' timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// A subprocess exited unsuccessfully where success was required.
    #[error("'{command}' failed: {message}")]
    Command { command: String, message: String },

    /// The build result cannot be validated (no entries, unknown output directory).
    #[error("Cannot validate build: {0}")]
    InvalidInput(String),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ValidateError>;

impl ValidateError {
    pub fn env(path: impl Into<PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        ValidateError::Environment {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ValidateError::Discrepancy { .. } => "VALIDATION_DISCREPANCY",
            ValidateError::Environment { .. } => "VALIDATION_ENVIRONMENT",
            ValidateError::ToolUnavailable { .. } => "VALIDATION_TOOL_UNAVAILABLE",
            ValidateError::Timeout { .. } => "VALIDATION_TIMEOUT",
            ValidateError::Command { .. } => "VALIDATION_COMMAND",
            ValidateError::InvalidInput(_) => "VALIDATION_INVALID_INPUT",
            ValidateError::Snapshot(_) => "VALIDATION_SNAPSHOT",
            ValidateError::Io(_) => "IO_ERROR",
            ValidateError::Json(_) => "JSON_ERROR",
        }
    }
}

impl From<ValidateError> for kiln_bundler::Error {
    fn from(error: ValidateError) -> Self {
        kiln_bundler::Error::validation(error.to_string(), Some(Box::new(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_bundler_validation_error() {
        let err = ValidateError::Discrepancy {
            stage: ValidationStage::ExportComparison,
            details: vec!["missing export 'bar'".to_string()],
        };
        assert_eq!(err.code(), "VALIDATION_DISCREPANCY");
        assert!(err.to_string().contains("missing export 'bar'"));

        let converted: kiln_bundler::Error = err.into();
        assert_eq!(converted.code(), "VALIDATION_ERROR");
        assert!(std::error::Error::source(&converted).is_some());
    }
}
