//! Settings for post-build validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which validation stages run. Disabled stages are skipped, not failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub exports: bool,
    pub imports: bool,
    pub behavior: bool,
    pub runtime: bool,
    pub api: bool,
    pub performance: bool,
    pub integration: bool,
    pub snapshot: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            exports: true,
            imports: true,
            behavior: true,
            runtime: true,
            api: true,
            performance: true,
            integration: true,
            snapshot: true,
        }
    }
}

impl StageToggles {
    pub fn none() -> Self {
        Self {
            exports: false,
            imports: false,
            behavior: false,
            runtime: false,
            api: false,
            performance: false,
            integration: false,
            snapshot: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub enabled: bool,

    /// Discrepancies fail the validation instead of becoming warnings.
    pub strict: bool,

    /// Globs (relative to the project root) selecting test files to copy.
    pub test_pattern: Vec<String>,

    /// Copy the original `src/` tree into the sandbox.
    pub include_src: bool,

    pub install_dependencies: bool,

    pub keep_temp_files: bool,

    /// Test run timeout.
    pub timeout_ms: u64,

    pub install_timeout_ms: u64,

    /// Overrides the detected test command, e.g. `"pnpm vitest run"`.
    pub test_command: Option<String>,

    pub stages: StageToggles,

    /// Snapshot store location; `<cwd>/.kiln/validation-snapshots.json` when unset.
    pub snapshot_path: Option<PathBuf>,

    /// Replace the stored snapshot baseline instead of diffing against it.
    pub update_snapshots: bool,

    /// Reuse results for identical (build, config, output dir) inputs.
    pub cache: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strict: false,
            test_pattern: vec![
                "**/*.test.*".to_string(),
                "**/*.spec.*".to_string(),
                "test/**/*".to_string(),
                "tests/**/*".to_string(),
                "__tests__/**/*".to_string(),
            ],
            include_src: false,
            install_dependencies: true,
            keep_temp_files: false,
            timeout_ms: 120_000,
            install_timeout_ms: 300_000,
            test_command: None,
            stages: StageToggles::default(),
            snapshot_path: None,
            update_snapshots: false,
            cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_stage_table_keeps_other_defaults() {
        let settings: ValidationSettings = serde_json::from_value(json!({
            "enabled": true,
            "stages": { "runtime": false }
        }))
        .unwrap();

        assert!(settings.enabled);
        assert!(!settings.stages.runtime);
        assert!(settings.stages.exports);
        assert!(settings.install_dependencies);
        assert_eq!(settings.timeout_ms, 120_000);
    }
}
