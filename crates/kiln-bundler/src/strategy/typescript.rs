use std::sync::Arc;

use kiln_config::{BuilderConfig, LibraryType};

use super::{BuildStrategy, StrategyValidation, resolve_entries, unify, validate_common};
use crate::Result;
use crate::plugins::{PluginDescriptor, PluginProviderRegistry};
use crate::unified::UnifiedConfig;

/// Plain TypeScript/JavaScript libraries. Also the detection fallback.
pub struct TypescriptStrategy {
    providers: Arc<PluginProviderRegistry>,
}

impl TypescriptStrategy {
    pub fn new(providers: Arc<PluginProviderRegistry>) -> Self {
        Self { providers }
    }
}

impl BuildStrategy for TypescriptStrategy {
    fn name(&self) -> &str {
        "typescript"
    }

    fn library_type(&self) -> LibraryType {
        LibraryType::Typescript
    }

    fn apply_strategy(&self, config: &BuilderConfig) -> Result<UnifiedConfig> {
        let input = resolve_entries(&config.root, config.input.as_ref())?;
        unify(
            config,
            LibraryType::Typescript,
            input,
            self.recommended_plugins(config),
            &self.providers,
        )
    }

    fn recommended_plugins(&self, _config: &BuilderConfig) -> Vec<PluginDescriptor> {
        Vec::new()
    }

    fn validate_config(&self, config: &BuilderConfig) -> StrategyValidation {
        let mut validation = validate_common(config);
        if !config.root.join("tsconfig.json").is_file() {
            validation.suggest("Add a tsconfig.json so editors and tsc agree with the build");
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::OutputFormat;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn dependencies_are_external_by_default() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.ts"), "export const a = 1;").unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name":"my-utils","dependencies":{"lodash":"^4"},"peerDependencies":{"date-fns":"*"}}"#,
        )
        .unwrap();

        let config = BuilderConfig::new(dir.path())
            .with_formats([OutputFormat::Esm, OutputFormat::Esm, OutputFormat::Umd]);
        let strategy = TypescriptStrategy::new(Arc::new(PluginProviderRegistry::new()));
        let unified = strategy.apply_strategy(&config).unwrap();

        assert_eq!(unified.formats(), vec![OutputFormat::Esm, OutputFormat::Umd]);
        assert!(unified.external.matches("lodash/fp"));
        assert!(unified.external.matches("date-fns"));
        assert_eq!(unified.output[1].name.as_deref(), Some("myUtils"));
        assert_eq!(unified.output[0].name, None);
        assert!(unified.plugins.is_empty());
    }

    #[test]
    fn not_applicable_to_other_declared_types() {
        let strategy = TypescriptStrategy::new(Arc::new(PluginProviderRegistry::new()));
        assert!(strategy.is_applicable(&BuilderConfig::default()));
        assert!(!strategy.is_applicable(&BuilderConfig::default().with_library_type(LibraryType::Vue3)));
    }
}
