//! Build strategies.
//!
//! A [`BuildStrategy`] turns the user's [`BuilderConfig`] into a
//! [`UnifiedConfig`] for one [`LibraryType`]: it resolves entries, decides
//! the external policy and picks plugins. The [`StrategyManager`] is a plain
//! lookup table; asking for an unregistered type is an error.

mod entries;
mod framework;
mod mixed;
mod style;
mod typescript;

pub use entries::{is_entry_candidate, resolve_entries};
pub use framework::{FrameworkProfile, FrameworkStrategy};
pub use mixed::MixedStrategy;
pub use style::StyleStrategy;
pub use typescript::TypescriptStrategy;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use kiln_config::{BuilderConfig, EntryConfig, ExternalConfig, LibraryType, OutputFormat};
use kiln_config::validation::is_glob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::adapter::{AdapterFeature, engine_supports};
use crate::plugins::{PluginDescriptor, PluginProviderRegistry};
use crate::unified::{External, UnifiedConfig, UnifiedInput, UnifiedOutputConfig};
use crate::{Error, Result};

/// Outcome of checking a config against a strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl StrategyValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn suggest(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }

    pub fn merge(&mut self, other: StrategyValidation) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.suggestions.extend(other.suggestions);
    }
}

pub trait BuildStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn library_type(&self) -> LibraryType;

    fn apply_strategy(&self, config: &BuilderConfig) -> Result<UnifiedConfig>;

    /// A config is applicable unless it explicitly names another type.
    fn is_applicable(&self, config: &BuilderConfig) -> bool {
        config
            .library_type
            .is_none_or(|declared| declared == self.library_type())
    }

    /// Defaults a new project of this type starts from.
    fn default_config(&self) -> BuilderConfig {
        BuilderConfig::default().with_library_type(self.library_type())
    }

    fn recommended_plugins(&self, config: &BuilderConfig) -> Vec<PluginDescriptor>;

    fn validate_config(&self, config: &BuilderConfig) -> StrategyValidation {
        validate_common(config)
    }
}

/// Registered strategies keyed by library type.
pub struct StrategyManager {
    strategies: HashMap<LibraryType, Arc<dyn BuildStrategy>>,
    providers: Arc<PluginProviderRegistry>,
}

impl Default for StrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrategyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyManager")
            .field("types", &self.library_types())
            .finish()
    }
}

impl StrategyManager {
    pub fn new() -> Self {
        Self::with_providers(Arc::new(PluginProviderRegistry::new()))
    }

    /// Manager with every built-in strategy, sharing `providers`.
    pub fn with_providers(providers: Arc<PluginProviderRegistry>) -> Self {
        let mut manager = Self {
            strategies: HashMap::new(),
            providers: Arc::clone(&providers),
        };
        manager.register(TypescriptStrategy::new(Arc::clone(&providers)));
        manager.register(StyleStrategy::new(Arc::clone(&providers)));
        for profile in FrameworkProfile::ALL {
            manager.register(FrameworkStrategy::new(profile, Arc::clone(&providers)));
        }
        manager.register(MixedStrategy::new(providers));
        manager
    }

    /// Register a strategy, replacing any previous one for its type.
    pub fn register(&mut self, strategy: impl BuildStrategy + 'static) {
        let strategy: Arc<dyn BuildStrategy> = Arc::new(strategy);
        debug!(strategy = strategy.name(), "Registered build strategy");
        self.strategies.insert(strategy.library_type(), strategy);
    }

    pub fn get_strategy(&self, library_type: LibraryType) -> Result<Arc<dyn BuildStrategy>> {
        self.strategies
            .get(&library_type)
            .cloned()
            .ok_or(Error::StrategyNotFound(library_type))
    }

    pub fn has_strategy(&self, library_type: LibraryType) -> bool {
        self.strategies.contains_key(&library_type)
    }

    pub fn library_types(&self) -> Vec<LibraryType> {
        let mut types: Vec<_> = self.strategies.keys().copied().collect();
        types.sort();
        types
    }

    pub fn providers(&self) -> &Arc<PluginProviderRegistry> {
        &self.providers
    }
}

/// Checks every strategy shares.
pub fn validate_common(config: &BuilderConfig) -> StrategyValidation {
    let mut validation = StrategyValidation::ok();

    if config.output.formats.is_empty() {
        validation.error("At least one output format is required");
    }

    let single_file: Vec<_> = config
        .output
        .formats
        .iter()
        .filter(|f| f.is_single_file())
        .collect();
    if !single_file.is_empty() && declares_multiple_entries(config) && !config.output.force_multi_entry
    {
        validation.warn(format!(
            "{} output is skipped for multi-entry builds",
            single_file
                .iter()
                .map(|f| f.as_str().to_uppercase())
                .collect::<Vec<_>>()
                .join("/")
        ));
        validation.suggest("Set output.force_multi_entry to bundle every entry into one file");
    }

    if config.performance.size_limit == Some(0) {
        validation.error("performance.size_limit must be greater than zero");
    }

    if config.performance.minify && config.mode == kiln_config::BuildMode::Development {
        validation.warn("Minification is enabled in development mode");
    }

    if config.dts && !engine_supports(config.bundler, AdapterFeature::Declarations) {
        validation.warn(format!(
            "Type declarations are not emitted by {}",
            config.bundler
        ));
        validation.suggest("Run `tsc --emitDeclarationOnly` alongside the build");
    }

    validation
}

fn declares_multiple_entries(config: &BuilderConfig) -> bool {
    match &config.input {
        None => true,
        Some(EntryConfig::Single(entry)) => is_glob(entry),
        Some(EntryConfig::Multiple(entries)) => entries.len() > 1 || entries.iter().any(|e| is_glob(e)),
        Some(EntryConfig::Named(map)) => map.len() > 1,
    }
}

/// Fields of `package.json` strategies care about.
#[derive(Debug, Clone, Default)]
pub(crate) struct Manifest {
    pub name: Option<String>,
    pub dependencies: Vec<String>,
    pub peer_dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
}

impl Manifest {
    pub fn read(root: &Path) -> Self {
        let Some(value) = std::fs::read_to_string(root.join("package.json"))
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        else {
            return Self::default();
        };

        let keys = |field: &str| -> Vec<String> {
            value
                .get(field)
                .and_then(Value::as_object)
                .map(|deps| deps.keys().cloned().collect())
                .unwrap_or_default()
        };

        Self {
            name: value.get("name").and_then(Value::as_str).map(str::to_string),
            dependencies: keys("dependencies"),
            peer_dependencies: keys("peerDependencies"),
            dev_dependencies: keys("devDependencies"),
        }
    }

    pub fn declares(&self, package: &str) -> bool {
        self.dependencies.iter().any(|d| d == package)
            || self.peer_dependencies.iter().any(|d| d == package)
            || self.dev_dependencies.iter().any(|d| d == package)
    }

    /// Runtime dependencies that stay external when the user names none.
    pub fn runtime_packages(&self) -> Vec<String> {
        let mut packages = self.dependencies.clone();
        for peer in &self.peer_dependencies {
            if !packages.contains(peer) {
                packages.push(peer.clone());
            }
        }
        packages
    }
}

/// Global variable name for UMD/IIFE builds: `@scope/my-lib` → `myLib`.
pub(crate) fn global_name(package_name: &str) -> String {
    let bare = package_name.rsplit('/').next().unwrap_or(package_name);
    let mut name = String::with_capacity(bare.len());
    let mut upper = false;
    for c in bare.chars() {
        if c.is_ascii_alphanumeric() {
            if upper && !name.is_empty() {
                name.push(c.to_ascii_uppercase());
            } else {
                name.push(c);
            }
            upper = false;
        } else {
            upper = true;
        }
    }
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "lib");
    }
    name
}

/// Assemble a [`UnifiedConfig`] from resolved entries and plugin descriptors.
pub(crate) fn unify(
    config: &BuilderConfig,
    library_type: LibraryType,
    input: UnifiedInput,
    recommended: Vec<PluginDescriptor>,
    providers: &PluginProviderRegistry,
) -> Result<UnifiedConfig> {
    let mut formats: Vec<OutputFormat> = Vec::new();
    for format in &config.output.formats {
        if !formats.contains(format) {
            formats.push(*format);
        }
    }
    if formats.is_empty() {
        return Err(Error::Config {
            message: "No output formats configured".to_string(),
            suggestion: Some("Set output.formats, e.g. [\"esm\", \"cjs\"]".to_string()),
        });
    }

    let manifest = Manifest::read(&config.root);
    let external = match &config.external {
        Some(external) => External::try_from(external)?,
        None => External::None.with_packages(manifest.runtime_packages()),
    };

    let mut globals = config.output.globals.clone();
    if let Some(ExternalConfig::Object(map)) = &config.external {
        for (package, global) in map {
            globals.entry(package.clone()).or_insert_with(|| global.clone());
        }
    }

    let global = config
        .output
        .name
        .clone()
        .or_else(|| manifest.name.as_deref().map(global_name));

    let out_dir = config.output_dir();
    let output = formats
        .iter()
        .map(|format| UnifiedOutputConfig {
            name: format.is_single_file().then(|| global.clone()).flatten(),
            entry_file_names: config.output.file_name.clone(),
            sourcemap: config.output.sourcemap,
            globals: globals.clone(),
            banner: config.output.banner.clone(),
            footer: config.output.footer.clone(),
            intro: config.output.intro.clone(),
            outro: config.output.outro.clone(),
            ..UnifiedOutputConfig::new(*format, &out_dir)
        })
        .collect();

    let mut descriptors: Vec<PluginDescriptor> = config
        .plugins
        .iter()
        .filter(|p| p.enabled)
        .map(PluginDescriptor::from)
        .collect();
    descriptors.extend(recommended);
    let resolved = providers.resolve(&descriptors, &config.root)?;

    let mut unified = UnifiedConfig::new(&config.root, input);
    unified.output = output;
    unified.external = external;
    unified.plugins = resolved.plugins;
    unified.warnings = resolved.warnings;
    unified.treeshake = config.performance.treeshake;
    unified.minify = config.performance.minify;
    unified.sourcemap = config.output.sourcemap;
    unified.watch = config.watch;
    unified.force_multi_entry = config.output.force_multi_entry;
    unified.strict = config.strict;
    unified.dts = config.dts;
    unified.mode = config.mode;
    unified.library_type = library_type;
    unified.bundler = config.bundler;
    Ok(unified)
}

/// `process.env.NODE_ENV` replacement for the build mode.
pub(crate) fn node_env_replacement(config: &BuilderConfig) -> PluginDescriptor {
    PluginDescriptor::new("replace").with_options(serde_json::json!({
        "values": {
            "process.env.NODE_ENV": format!("\"{}\"", config.mode.as_str()),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_names_are_camel_cased() {
        assert_eq!(global_name("@acme/my-lib"), "myLib");
        assert_eq!(global_name("date_utils"), "dateUtils");
        assert_eq!(global_name("3d-kit"), "lib3dKit");
        assert_eq!(global_name("---"), "lib");
    }

    #[test]
    fn manager_has_every_library_type() {
        let manager = StrategyManager::new();
        for library_type in LibraryType::ALL {
            assert!(manager.has_strategy(library_type), "{library_type}");
        }
        assert_eq!(manager.library_types().len(), LibraryType::ALL.len());
    }

    #[test]
    fn common_validation_flags_problems() {
        let mut config = BuilderConfig::default()
            .with_input(EntryConfig::Multiple(vec!["src/a.ts".into(), "src/b.ts".into()]))
            .with_formats([OutputFormat::Esm, OutputFormat::Umd]);
        config.performance.size_limit = Some(0);

        let validation = validate_common(&config);
        assert!(!validation.valid);
        assert!(validation.warnings.iter().any(|w| w.contains("UMD")));
        assert!(!validation.suggestions.is_empty());
    }

    #[test]
    fn forced_multi_entry_does_not_warn() {
        let mut config = BuilderConfig::default()
            .with_input("src/*.ts")
            .with_formats([OutputFormat::Iife]);
        config.output.force_multi_entry = true;
        assert!(validate_common(&config).warnings.is_empty());
    }
}
