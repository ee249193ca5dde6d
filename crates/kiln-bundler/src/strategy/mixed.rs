use std::sync::Arc;

use kiln_config::{BuilderConfig, LibraryType};

use super::{
    BuildStrategy, FrameworkProfile, Manifest, StrategyValidation, node_env_replacement,
    resolve_entries, unify, validate_common,
};
use crate::Result;
use crate::plugins::{PluginDescriptor, PluginProviderRegistry};
use crate::unified::UnifiedConfig;

/// Projects combining several frameworks, or none confidently.
///
/// Externalizes the runtime of every framework the manifest declares.
pub struct MixedStrategy {
    providers: Arc<PluginProviderRegistry>,
}

impl MixedStrategy {
    pub fn new(providers: Arc<PluginProviderRegistry>) -> Self {
        Self { providers }
    }

    fn declared_frameworks(manifest: &Manifest) -> Vec<FrameworkProfile> {
        let mut profiles: Vec<FrameworkProfile> = Vec::new();
        for profile in FrameworkProfile::ALL {
            let primary = profile.primary_package();
            // Vue 2 and Vue 3 share a runtime package.
            if manifest.declares(primary) && !profiles.iter().any(|p| p.primary_package() == primary) {
                profiles.push(profile);
            }
        }
        profiles
    }
}

impl BuildStrategy for MixedStrategy {
    fn name(&self) -> &str {
        "mixed"
    }

    fn library_type(&self) -> LibraryType {
        LibraryType::Mixed
    }

    fn apply_strategy(&self, config: &BuilderConfig) -> Result<UnifiedConfig> {
        let input = resolve_entries(&config.root, config.input.as_ref())?;
        let mut unified = unify(
            config,
            LibraryType::Mixed,
            input,
            self.recommended_plugins(config),
            &self.providers,
        )?;

        let manifest = Manifest::read(&config.root);
        let runtime: Vec<&str> = Self::declared_frameworks(&manifest)
            .iter()
            .flat_map(|p| p.runtime.iter().copied())
            .collect();
        unified.external = std::mem::take(&mut unified.external).with_packages(runtime);
        Ok(unified)
    }

    fn recommended_plugins(&self, config: &BuilderConfig) -> Vec<PluginDescriptor> {
        vec![node_env_replacement(config)]
    }

    fn validate_config(&self, config: &BuilderConfig) -> StrategyValidation {
        let mut validation = validate_common(config);
        let frameworks = Self::declared_frameworks(&Manifest::read(&config.root));
        if frameworks.len() > 1 {
            validation.warn(format!(
                "Several frameworks are declared ({}); each runtime stays external",
                frameworks
                    .iter()
                    .map(|p| p.primary_package())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        validation.suggest("Set `type` explicitly if the project targets a single framework");
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn externalizes_every_declared_framework() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.ts"), "export {};").unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"devDependencies":{"vue":"^3.4.0","react":"^18.0.0"}}"#,
        )
        .unwrap();

        let strategy = MixedStrategy::new(Arc::new(PluginProviderRegistry::new()));
        let config = BuilderConfig::new(dir.path());
        let unified = strategy.apply_strategy(&config).unwrap();

        assert!(unified.external.matches("vue"));
        assert!(unified.external.matches("react-dom/client"));
        assert!(!unified.external.matches("lodash"));

        let validation = strategy.validate_config(&config);
        assert_eq!(validation.warnings.len(), 1);
    }
}
