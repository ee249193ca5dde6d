//! CLI error type and its miette rendering.
//!
//! Library errors convert into [`CliError`] through `#[from]`; `main` turns the
//! final error into a [`miette::Report`] with [`cli_error_to_miette`], which
//! keeps the bundler's diagnostic codes and help text.

use std::path::PathBuf;

use kiln_config::ConfigError;
use kiln_validate::ValidateError;
use miette::Report;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] kiln_bundler::Error),

    #[error("Validation error: {0}")]
    Validate(#[from] ValidateError),

    /// The validation ran but found problems.
    #[error("Validation failed in {count} stage(s)")]
    ValidationFailed { count: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Project root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ValidationFailed { .. } | CliError::Validate(_) => 2,
            CliError::InvalidArgument(_) | CliError::RootNotFound(_) => 64,
            _ => 1,
        }
    }
}

/// Convert a [`CliError`] into a miette report for display.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => Report::new(e),
        CliError::Config(e) => match e.hint() {
            Some(hint) => miette::miette!(help = hint.to_string(), "Configuration error: {e}"),
            None => miette::miette!("Configuration error: {e}"),
        },
        CliError::Validate(e) => {
            miette::miette!(code = e.code(), "Validation error: {e}")
        }
        CliError::ValidationFailed { count } => miette::miette!(
            help = "Run with --verbose for per-stage details, or --report to write the full report",
            "Validation failed in {count} stage(s)"
        ),
        CliError::RootNotFound(path) => miette::miette!(
            help = "Pass the library directory as the first argument",
            "Project root not found: {}",
            path.display()
        ),
        other => miette::miette!("{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::ValidationFailed { count: 1 }.exit_code(), 2);
        assert_eq!(CliError::InvalidArgument("x".into()).exit_code(), 64);
        assert_eq!(CliError::Config(ConfigError::NotFound).exit_code(), 1);
    }

    #[test]
    fn test_bundler_error_keeps_diagnostic_code() {
        let err = CliError::from(kiln_bundler::Error::EmptyOutput);
        let report = cli_error_to_miette(err);
        let code = report.code().map(|c| c.to_string());
        assert!(code.is_some());
        assert_eq!(report.to_string(), "Build produced no output files");
    }

    #[test]
    fn test_validation_failure_has_help() {
        let report = cli_error_to_miette(CliError::ValidationFailed { count: 3 });
        assert_eq!(report.to_string(), "Validation failed in 3 stage(s)");
        assert!(report.help().is_some());
    }
}
