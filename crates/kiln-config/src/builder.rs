//! The user-facing build configuration consumed by strategies.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::postbuild::ValidationSettings;
use crate::types::{BuildMode, BundlerKind, LibraryType, OutputFormat};

/// How the user declared the build entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryConfig {
    /// A single path or glob pattern.
    Single(String),
    /// A list of paths and/or glob patterns.
    Multiple(Vec<String>),
    /// Explicit entry name to path mapping.
    Named(BTreeMap<String, String>),
}

impl EntryConfig {
    /// All declared path strings, regardless of shape.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            EntryConfig::Single(path) => vec![path.as_str()],
            EntryConfig::Multiple(paths) => paths.iter().map(String::as_str).collect(),
            EntryConfig::Named(map) => map.values().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for EntryConfig {
    fn from(value: &str) -> Self {
        EntryConfig::Single(value.to_string())
    }
}

/// How the user declared external (non-bundled) dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalConfig {
    List(Vec<String>),
    Pattern { regex: String },
    /// Package name to global variable name; only the keys are external.
    Object(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginOptions {
    pub name: String,

    #[serde(default)]
    pub options: Value,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PluginOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(default = "default_out_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_formats", alias = "format")]
    pub formats: Vec<OutputFormat>,

    /// Global name for UMD/IIFE bundles.
    #[serde(default)]
    pub name: Option<String>,

    /// Entry file name template override, e.g. `[name].mjs`.
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub sourcemap: bool,

    #[serde(default)]
    pub globals: BTreeMap<String, String>,

    #[serde(default)]
    pub banner: Option<String>,

    #[serde(default)]
    pub footer: Option<String>,

    #[serde(default)]
    pub intro: Option<String>,

    #[serde(default)]
    pub outro: Option<String>,

    /// Build UMD/IIFE from a synthetic wrapper when there are several entries.
    #[serde(default)]
    pub force_multi_entry: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: default_out_dir(),
            formats: default_formats(),
            name: None,
            file_name: None,
            sourcemap: false,
            globals: BTreeMap::new(),
            banner: None,
            footer: None,
            intro: None,
            outro: None,
            force_multi_entry: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceOptions {
    #[serde(default = "default_true")]
    pub treeshake: bool,

    #[serde(default)]
    pub minify: bool,

    /// Maximum total gzip size in bytes. Accepts `"50kb"` style strings.
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size_limit: Option<u64>,
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self {
            treeshake: true,
            minify: false,
            size_limit: None,
        }
    }
}

/// Framework-agnostic description of a library build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default, alias = "entry")]
    pub input: Option<EntryConfig>,

    #[serde(default)]
    pub output: OutputOptions,

    #[serde(default)]
    pub external: Option<ExternalConfig>,

    /// Explicit library type; detected when absent.
    #[serde(default, rename = "type", alias = "library_type")]
    pub library_type: Option<LibraryType>,

    #[serde(default)]
    pub bundler: BundlerKind,

    #[serde(default)]
    pub mode: BuildMode,

    /// Remove the output directory before building.
    #[serde(default)]
    pub clean: bool,

    /// Upgrade output warnings to errors.
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub watch: bool,

    /// Request type declaration output.
    #[serde(default)]
    pub dts: bool,

    #[serde(default)]
    pub plugins: Vec<PluginOptions>,

    /// Per-framework option blocks, keyed by framework name.
    #[serde(default)]
    pub framework: BTreeMap<String, Value>,

    #[serde(default)]
    pub performance: PerformanceOptions,

    #[serde(default)]
    pub validation: ValidationSettings,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            input: None,
            output: OutputOptions::default(),
            external: None,
            library_type: None,
            bundler: BundlerKind::default(),
            mode: BuildMode::default(),
            clean: false,
            strict: false,
            watch: false,
            dts: false,
            plugins: Vec::new(),
            framework: BTreeMap::new(),
            performance: PerformanceOptions::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl BuilderConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<EntryConfig>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        self.output.formats = formats.into_iter().collect();
        self
    }

    pub fn with_library_type(mut self, library_type: LibraryType) -> Self {
        self.library_type = Some(library_type);
        self
    }

    pub fn with_bundler(mut self, bundler: BundlerKind) -> Self {
        self.bundler = bundler;
        self
    }

    /// Absolute (root-joined) output directory.
    pub fn output_dir(&self) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            self.root.join(&self.output.dir)
        }
    }

    /// Options block for a framework, if configured.
    pub fn framework_options(&self, framework: &str) -> Option<&Value> {
        self.framework.get(framework)
    }
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Esm, OutputFormat::Cjs]
}

/// Parse `"512"`, `"10kb"`, `"1.5 MB"` into bytes.
pub fn parse_size(raw: &str) -> Option<u64> {
    let lowered = raw.trim().to_ascii_lowercase();
    let split = lowered
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lowered.len());
    let (number, unit) = lowered.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier = match unit.trim() {
        "" | "b" => 1.0,
        "kb" | "k" => 1024.0,
        "mb" | "m" => 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bytes(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Bytes(bytes)) => Ok(Some(bytes)),
        Some(Raw::Text(text)) => parse_size(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_shapes_deserialize() {
        let single: EntryConfig = serde_json::from_value(json!("src/index.ts")).unwrap();
        assert_eq!(single, EntryConfig::Single("src/index.ts".into()));

        let multiple: EntryConfig =
            serde_json::from_value(json!(["src/a.ts", "src/b.ts"])).unwrap();
        assert_eq!(multiple.paths(), vec!["src/a.ts", "src/b.ts"]);

        let named: EntryConfig = serde_json::from_value(json!({"main": "src/index.ts"})).unwrap();
        assert!(matches!(named, EntryConfig::Named(_)));
    }

    #[test]
    fn external_pattern_and_object() {
        let pattern: ExternalConfig = serde_json::from_value(json!({"regex": "^lodash"})).unwrap();
        assert_eq!(
            pattern,
            ExternalConfig::Pattern {
                regex: "^lodash".into()
            }
        );

        let object: ExternalConfig = serde_json::from_value(json!({"vue": "Vue"})).unwrap();
        assert!(matches!(object, ExternalConfig::Object(_)));
    }

    #[test]
    fn defaults_are_esm_and_cjs_into_dist() {
        let config: BuilderConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.output.formats, vec![OutputFormat::Esm, OutputFormat::Cjs]);
        assert_eq!(config.output.dir, PathBuf::from("dist"));
        assert!(config.performance.treeshake);
        assert!(config.library_type.is_none());
    }

    #[test]
    fn size_limit_accepts_strings() {
        let perf: PerformanceOptions =
            serde_json::from_value(json!({"size_limit": "10kb"})).unwrap();
        assert_eq!(perf.size_limit, Some(10 * 1024));

        let perf: PerformanceOptions = serde_json::from_value(json!({"size_limit": 300})).unwrap();
        assert_eq!(perf.size_limit, Some(300));

        assert!(serde_json::from_value::<PerformanceOptions>(json!({"size_limit": "lots"})).is_err());
    }

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("1.5 MB"), Some(1_572_864));
        assert_eq!(parse_size("2k"), Some(2048));
        assert_eq!(parse_size("ten"), None);
    }

    #[test]
    fn output_dir_joins_root() {
        let config = BuilderConfig::new("/project");
        assert_eq!(config.output_dir(), PathBuf::from("/project/dist"));
    }
}
