//! File-based config discovery for CLI use.
//!
//! Layers, lowest priority first: built-in defaults, the discovered config
//! file, then `KILN_*` environment variables (`__` separates nesting, so
//! `KILN_BUILD__BUNDLER=esbuild` sets `build.bundler`).

use std::fs;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde_json::Value;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE_NAME: &str = "kiln.toml";
pub const PACKAGE_JSON_FIELD: &str = "kiln";
pub const ENV_PREFIX: &str = "KILN_";

/// Searches for kiln configuration in conventional locations and loads it.
///
/// Library users can build a [`KilnConfig`] directly with
/// [`KilnConfig::from_value`] instead.
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
    use_env: bool,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            use_env: true,
        }
    }

    /// Skip the environment layer.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Find a config file in the root directory.
    ///
    /// Searches `kiln.toml` first, then a non-null `kiln` field in `package.json`.
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(CONFIG_FILE_NAME);
        if toml_path.exists() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed: Value = serde_json::from_str(&content).ok()?;
        match parsed.get(PACKAGE_JSON_FIELD) {
            Some(field) if !field.is_null() => Some(pkg_path),
            _ => None,
        }
    }

    /// Load config from the discovered file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<KilnConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        self.load_from(&path)
    }

    /// Like [`load`](Self::load), but a missing file yields defaults rooted here.
    pub fn load_or_default(&self) -> Result<KilnConfig> {
        match self.find() {
            Some(path) => self.load_from(&path),
            None => self.extract(self.base_figment()),
        }
    }

    pub fn load_with_profile(&self, profile: &str) -> Result<KilnConfig> {
        self.load()?.materialize_profile(Some(profile))
    }

    /// Load config from a specific file path (`*.toml` or `package.json`).
    pub fn load_from(&self, path: &Path) -> Result<KilnConfig> {
        let figment = if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
            let value = self.read_package_json_field(path)?;
            self.base_figment().merge(Serialized::defaults(value))
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            if !path.exists() {
                return Err(ConfigError::NotFound);
            }
            self.base_figment().merge(Toml::file(path))
        } else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };

        tracing::debug!(path = %path.display(), "loading kiln config");
        self.extract(figment)
    }

    fn base_figment(&self) -> Figment {
        let mut defaults = KilnConfig::default();
        defaults.build.root = self.root.clone();
        Figment::new().merge(Serialized::defaults(defaults))
    }

    fn extract(&self, mut figment: Figment) -> Result<KilnConfig> {
        if self.use_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let mut config: KilnConfig = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            hint: Some(e.to_string()),
        })?;

        if config.build.root.is_relative() {
            config.build.root = self.root.join(&config.build.root);
        }
        Ok(config)
    }

    fn read_package_json_field(&self, path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)?;

        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: "package.json".to_string(),
                hint: Some(format!("Invalid JSON: {e}")),
            })?;

        match parsed.get(PACKAGE_JSON_FIELD) {
            Some(Value::Object(map)) => Ok(Value::Object(map.clone())),
            Some(Value::Null) | None => Err(ConfigError::InvalidValue {
                field: PACKAGE_JSON_FIELD.to_string(),
                hint: Some("Add a 'kiln' object to your package.json".to_string()),
            }),
            Some(_) => Err(ConfigError::InvalidValue {
                field: PACKAGE_JSON_FIELD.to_string(),
                hint: Some("The 'kiln' field must be an object".to_string()),
            }),
        }
    }
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}

/// Discover and load config from the current directory with a profile applied.
pub fn discover_with_profile(profile: &str) -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_with_profile(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn find_prefers_toml_over_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"kiln": {}}"#).unwrap();
        fs::write(dir.path().join("kiln.toml"), "[build]\n").unwrap();

        let found = ConfigDiscovery::new(dir.path()).find().unwrap();
        assert_eq!(found, dir.path().join("kiln.toml"));
    }

    #[test]
    fn package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "lib"}"#).unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn load_returns_not_found_when_no_config() {
        let dir = TempDir::new().unwrap();
        let err = ConfigDiscovery::new(dir.path()).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }

    #[test]
    fn load_or_default_roots_build_at_discovery_dir() {
        let dir = TempDir::new().unwrap();
        let config = ConfigDiscovery::new(dir.path())
            .without_env()
            .load_or_default()
            .unwrap();
        assert_eq!(config.build.root, dir.path());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kiln.yaml");
        fs::write(&path, "build: {}").unwrap();
        let err = ConfigDiscovery::new(dir.path())
            .without_env()
            .load_from(&path)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn non_object_package_field_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, r#"{"kiln": "yes"}"#).unwrap();
        let err = ConfigDiscovery::new(dir.path())
            .without_env()
            .load_from(&path)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
