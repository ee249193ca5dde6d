//! Top-level configuration document and profile merging.
//!
//! For file discovery, see the `discovery` module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::BuilderConfig;
use crate::error::{ConfigError, Result as ConfigResult};
use crate::postbuild::ValidationSettings;
use crate::settings::GlobalSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub build: BuilderConfig,

    /// Top-level `[validation]` table; overrides `build.validation` when present.
    #[serde(default)]
    pub validation: Option<ValidationSettings>,

    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,

    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub build: Value,

    #[serde(default)]
    pub validation: Value,

    #[serde(default)]
    pub settings: Value,
}

impl KilnConfig {
    /// Create from a JSON value (programmatic config).
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::{KilnConfig, OutputFormat};
    /// use serde_json::json;
    ///
    /// let config = KilnConfig::from_value(json!({
    ///     "build": { "input": "src/index.ts", "output": { "formats": ["esm"] } }
    /// }))
    /// .unwrap();
    /// assert_eq!(config.build.output.formats, vec![OutputFormat::Esm]);
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Apply the named profile's overrides on top of the base sections.
    ///
    /// Unknown profile names leave the config untouched.
    pub fn materialize_profile(mut self, profile: Option<&str>) -> ConfigResult<Self> {
        let Some(name) = profile else {
            return Ok(self);
        };
        let Some(profile_cfg) = self.profiles.get(name).cloned() else {
            tracing::debug!(profile = name, "profile not defined, using base config");
            return Ok(self);
        };

        if !profile_cfg.build.is_null() {
            self.build = overlay(&self.build, &profile_cfg.build)?;
        }

        if !profile_cfg.validation.is_null() {
            let base = self.validation.clone().unwrap_or_default();
            self.validation = Some(overlay(&base, &profile_cfg.validation)?);
        }

        if !profile_cfg.settings.is_null() {
            self.settings = overlay(&self.settings, &profile_cfg.settings)?;
        }

        Ok(self)
    }

    /// The build configuration with the top-level validation table folded in.
    pub fn builder_config(&self) -> BuilderConfig {
        let mut build = self.build.clone();
        if let Some(validation) = &self.validation {
            build.validation = validation.clone();
        }
        build
    }
}

fn overlay<T>(base: &T, update: &Value) -> ConfigResult<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut merged = serde_json::to_value(base).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })?;
    merge_values(&mut merged, update);
    serde_json::from_value(merged).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

/// Deep-merge `update` into `target`. Objects merge per key, everything else replaces.
pub fn merge_values(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_values(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target_slot, _) => {
            *target_slot = update.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BundlerKind, OutputFormat};
    use serde_json::json;

    #[test]
    fn from_value_creates_config() {
        let config = KilnConfig::from_value(json!({
            "build": {
                "input": ["src/a.ts", "src/b.ts"],
                "bundler": "esbuild",
                "performance": { "minify": true }
            }
        }))
        .unwrap();

        assert_eq!(config.build.bundler, BundlerKind::Esbuild);
        assert!(config.build.performance.minify);
    }

    #[test]
    fn profile_merging_overrides_nested_fields() {
        let config = KilnConfig::from_value(json!({
            "build": {
                "output": { "formats": ["esm", "cjs"], "sourcemap": false },
                "performance": { "minify": false }
            },
            "profiles": {
                "production": {
                    "build": {
                        "output": { "formats": ["esm", "cjs", "umd"] },
                        "performance": { "minify": true }
                    }
                }
            }
        }))
        .unwrap()
        .materialize_profile(Some("production"))
        .unwrap();

        assert!(config.build.performance.minify);
        assert_eq!(
            config.build.output.formats,
            vec![OutputFormat::Esm, OutputFormat::Cjs, OutputFormat::Umd]
        );
        assert!(!config.build.output.sourcemap);
    }

    #[test]
    fn unknown_profile_is_a_no_op() {
        let config = KilnConfig::default()
            .materialize_profile(Some("staging"))
            .unwrap();
        assert!(config.validation.is_none());
    }

    #[test]
    fn invalid_profile_value_is_reported() {
        let err = KilnConfig::from_value(json!({
            "profiles": { "ci": { "build": { "bundler": "webpack" } } }
        }))
        .unwrap()
        .materialize_profile(Some("ci"))
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidProfileOverride { .. }));
    }

    #[test]
    fn top_level_validation_folds_into_build() {
        let config = KilnConfig::from_value(json!({
            "validation": { "enabled": true, "strict": true }
        }))
        .unwrap();

        let build = config.builder_config();
        assert!(build.validation.enabled);
        assert!(build.validation.strict);
    }

    #[test]
    fn merge_replaces_arrays() {
        let mut base = json!({"a": [1, 2], "b": {"c": 1}});
        merge_values(&mut base, &json!({"a": [3], "b": {"d": 2}}));
        assert_eq!(base, json!({"a": [3], "b": {"c": 1, "d": 2}}));
    }
}
