//! Stylesheet-only libraries.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_config::{BuilderConfig, LibraryType, OutputFormat};

use super::{BuildStrategy, StrategyValidation, resolve_entries, unify, validate_common};
use crate::plugins::{PluginDescriptor, PluginProviderRegistry};
use crate::unified::{UnifiedConfig, UnifiedInput};
use crate::{Error, Result};

const STYLE_ENTRIES: &[&str] = &[
    "src/index.css",
    "src/index.scss",
    "src/index.less",
    "src/styles/index.css",
    "styles/index.css",
    "index.css",
];

pub struct StyleStrategy {
    providers: Arc<PluginProviderRegistry>,
}

impl StyleStrategy {
    pub fn new(providers: Arc<PluginProviderRegistry>) -> Self {
        Self { providers }
    }

    fn resolve_input(&self, config: &BuilderConfig) -> Result<UnifiedInput> {
        if config.input.is_some() {
            return resolve_entries(&config.root, config.input.as_ref());
        }
        STYLE_ENTRIES
            .iter()
            .find(|candidate| config.root.join(candidate).is_file())
            .map(|entry| UnifiedInput::Single(PathBuf::from(entry)))
            .ok_or_else(|| Error::NoEntryMatches {
                patterns: STYLE_ENTRIES.iter().map(|s| s.to_string()).collect(),
            })
    }
}

impl BuildStrategy for StyleStrategy {
    fn name(&self) -> &str {
        "style"
    }

    fn library_type(&self) -> LibraryType {
        LibraryType::Style
    }

    /// Stylesheets have no module format; only the ESM pipeline is kept.
    fn apply_strategy(&self, config: &BuilderConfig) -> Result<UnifiedConfig> {
        let input = self.resolve_input(config)?;
        let mut unified = unify(
            config,
            LibraryType::Style,
            input,
            self.recommended_plugins(config),
            &self.providers,
        )?;

        let dropped: Vec<_> = unified
            .formats()
            .into_iter()
            .filter(|f| *f != OutputFormat::Esm)
            .collect();
        if !dropped.is_empty() {
            unified.warnings.push(format!(
                "Style libraries only emit one stylesheet build; ignoring {}",
                dropped.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        let template = unified.output.first().cloned();
        unified.output.retain(|o| o.format == OutputFormat::Esm);
        if unified.output.is_empty() {
            if let Some(mut esm) = template {
                esm.format = OutputFormat::Esm;
                esm.name = None;
                unified.output.push(esm);
            }
        }
        unified.treeshake = false;
        Ok(unified)
    }

    fn default_config(&self) -> BuilderConfig {
        BuilderConfig::default()
            .with_library_type(LibraryType::Style)
            .with_formats([OutputFormat::Esm])
    }

    fn recommended_plugins(&self, _config: &BuilderConfig) -> Vec<PluginDescriptor> {
        Vec::new()
    }

    fn validate_config(&self, config: &BuilderConfig) -> StrategyValidation {
        let mut validation = validate_common(config);
        if config.output.formats.iter().any(|f| *f != OutputFormat::Esm) {
            validation.warn("Only one stylesheet build is produced; extra formats are ignored");
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_conventional_stylesheet_and_keeps_one_format() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.scss"), ".btn { color: red; }").unwrap();

        let config = BuilderConfig::new(dir.path())
            .with_formats([OutputFormat::Cjs, OutputFormat::Umd]);
        let strategy = StyleStrategy::new(Arc::new(PluginProviderRegistry::new()));
        let unified = strategy.apply_strategy(&config).unwrap();

        assert_eq!(unified.input, UnifiedInput::Single(PathBuf::from("src/index.scss")));
        assert_eq!(unified.formats(), vec![OutputFormat::Esm]);
        assert_eq!(unified.warnings.len(), 1);
    }

    #[test]
    fn missing_stylesheet_is_an_error() {
        let dir = TempDir::new().unwrap();
        let strategy = StyleStrategy::new(Arc::new(PluginProviderRegistry::new()));
        let err = strategy.apply_strategy(&BuilderConfig::new(dir.path())).unwrap_err();
        assert!(err.is_config());
    }
}
