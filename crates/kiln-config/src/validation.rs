//! Pluggable config validation strategies.
//!
//! Separates filesystem validation (for CLI use) from schema validation
//! (for library use where sources may be virtual).

use std::path::{Path, PathBuf};

use crate::builder::{BuilderConfig, EntryConfig, ExternalConfig};
use crate::error::{ConfigError, Result};
use crate::types::OutputFormat;

pub trait ConfigValidator {
    fn validate(&self, config: &BuilderConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks).
///
/// ```
/// use kiln_config::{BuilderConfig, ConfigValidator, SchemaValidator};
///
/// let config = BuilderConfig::new(".").with_input("src/index.ts");
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &BuilderConfig) -> Result<()> {
        if config.output.formats.is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "at least one output format is required".to_string(),
                hint: Some("Set output.formats, e.g. [\"esm\", \"cjs\"]".to_string()),
            });
        }

        let mut seen = Vec::with_capacity(config.output.formats.len());
        for format in &config.output.formats {
            if seen.contains(format) {
                return Err(ConfigError::SchemaValidation {
                    message: format!("output format '{format}' is listed twice"),
                    hint: None,
                });
            }
            seen.push(*format);
        }

        if let Some(entry) = &config.input {
            if entry.paths().iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::SchemaValidation {
                    message: "entry paths cannot be empty".to_string(),
                    hint: Some("Remove empty strings from 'input'".to_string()),
                });
            }
            if let EntryConfig::Named(map) = entry {
                if map.keys().any(|k| k.trim().is_empty()) {
                    return Err(ConfigError::SchemaValidation {
                        message: "entry names cannot be empty".to_string(),
                        hint: None,
                    });
                }
            }
        }

        match &config.external {
            Some(ExternalConfig::List(list)) if list.iter().any(|e| e.trim().is_empty()) => {
                return Err(ConfigError::SchemaValidation {
                    message: "external package names cannot be empty".to_string(),
                    hint: Some("Remove empty strings from the 'external' array".to_string()),
                });
            }
            Some(ExternalConfig::Pattern { regex }) if regex.trim().is_empty() => {
                return Err(ConfigError::SchemaValidation {
                    message: "external regex cannot be empty".to_string(),
                    hint: None,
                });
            }
            _ => {}
        }

        let single_file = config
            .output
            .formats
            .iter()
            .any(OutputFormat::is_single_file);
        if single_file {
            if let Some(name) = &config.output.name {
                if !is_js_identifier(name) {
                    return Err(ConfigError::InvalidValue {
                        field: "output.name".to_string(),
                        hint: Some(format!(
                            "'{name}' is not a valid global variable name for UMD/IIFE output"
                        )),
                    });
                }
            }
        }

        for plugin in &config.plugins {
            if plugin.name.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "plugin name cannot be empty".to_string(),
                    hint: Some("Give every [[build.plugins]] entry a name".to_string()),
                });
            }
        }

        if config.validation.enabled && config.validation.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validation.timeout_ms".to_string(),
                hint: Some("Use a positive timeout in milliseconds".to_string()),
            });
        }

        Ok(())
    }
}

/// Filesystem validator (for CLI use).
///
/// Runs schema validation, then checks the root and literal entry paths exist.
/// Glob entries are left to entry resolution.
pub struct FsValidator {
    root: PathBuf,
}

impl FsValidator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &BuilderConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        if !self.root.is_dir() {
            return Err(ConfigError::RootNotFound {
                path: self.root.clone(),
            });
        }

        if let Some(entry) = &config.input {
            for raw in entry.paths() {
                if is_glob(raw) {
                    continue;
                }
                let path = self.root.join(raw);
                if !path.exists() {
                    return Err(ConfigError::EntryNotFound { path });
                }
            }
        }

        Ok(())
    }
}

pub fn validate_schema(config: &BuilderConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

pub fn validate_fs(config: &BuilderConfig, root: impl AsRef<Path>) -> Result<()> {
    FsValidator::new(root).validate(config)
}

/// Whether a path string contains glob metacharacters.
pub fn is_glob(raw: &str) -> bool {
    raw.contains(['*', '?', '[', '{'])
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    })
}
