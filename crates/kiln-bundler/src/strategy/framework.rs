//! One strategy per UI framework, differing only by a [`FrameworkProfile`].

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_config::{BuilderConfig, LibraryType};

use super::{
    BuildStrategy, Manifest, StrategyValidation, node_env_replacement, resolve_entries, unify,
    validate_common,
};
use crate::Result;
use crate::plugins::{PluginDescriptor, PluginProviderRegistry};
use crate::unified::UnifiedConfig;

/// What a framework contributes to a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkProfile {
    pub library_type: LibraryType,
    /// Packages that must never be bundled.
    pub runtime: &'static [&'static str],
    /// Default UMD/IIFE globals for the runtime packages.
    pub globals: &'static [(&'static str, &'static str)],
    /// Compiler plugin, when the framework needs one beyond JSX/TS.
    pub compiler: Option<&'static str>,
}

impl FrameworkProfile {
    pub const VUE2: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Vue2,
        runtime: &["vue"],
        globals: &[("vue", "Vue")],
        compiler: Some("vue2"),
    };

    pub const VUE3: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Vue3,
        runtime: &["vue"],
        globals: &[("vue", "Vue")],
        compiler: Some("vue"),
    };

    pub const REACT: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::React,
        runtime: &["react", "react-dom"],
        globals: &[("react", "React"), ("react-dom", "ReactDOM")],
        compiler: None,
    };

    pub const SVELTE: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Svelte,
        runtime: &["svelte"],
        globals: &[("svelte", "Svelte")],
        compiler: Some("svelte"),
    };

    pub const SOLID: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Solid,
        runtime: &["solid-js"],
        globals: &[("solid-js", "Solid")],
        compiler: Some("solid"),
    };

    pub const PREACT: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Preact,
        runtime: &["preact"],
        globals: &[("preact", "preact")],
        compiler: None,
    };

    pub const LIT: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Lit,
        runtime: &["lit", "lit-html", "lit-element", "@lit/reactive-element"],
        globals: &[("lit", "Lit")],
        compiler: None,
    };

    pub const ANGULAR: FrameworkProfile = FrameworkProfile {
        library_type: LibraryType::Angular,
        runtime: &["@angular/core", "@angular/common", "rxjs"],
        globals: &[("@angular/core", "ng.core"), ("@angular/common", "ng.common"), ("rxjs", "rxjs")],
        compiler: Some("angular"),
    };

    pub const ALL: [FrameworkProfile; 8] = [
        Self::VUE2,
        Self::VUE3,
        Self::REACT,
        Self::SVELTE,
        Self::SOLID,
        Self::PREACT,
        Self::LIT,
        Self::ANGULAR,
    ];

    pub fn for_type(library_type: LibraryType) -> Option<FrameworkProfile> {
        Self::ALL.into_iter().find(|p| p.library_type == library_type)
    }

    /// The package whose presence identifies the framework.
    pub fn primary_package(&self) -> &'static str {
        self.runtime.first().copied().unwrap_or_default()
    }
}

pub struct FrameworkStrategy {
    profile: FrameworkProfile,
    name: String,
    providers: Arc<PluginProviderRegistry>,
}

impl FrameworkStrategy {
    pub fn new(profile: FrameworkProfile, providers: Arc<PluginProviderRegistry>) -> Self {
        Self {
            name: profile.library_type.as_str().to_string(),
            profile,
            providers,
        }
    }

    pub fn profile(&self) -> &FrameworkProfile {
        &self.profile
    }
}

impl BuildStrategy for FrameworkStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn library_type(&self) -> LibraryType {
        self.profile.library_type
    }

    fn apply_strategy(&self, config: &BuilderConfig) -> Result<UnifiedConfig> {
        let input = resolve_entries(&config.root, config.input.as_ref())?;
        let mut unified = unify(
            config,
            self.profile.library_type,
            input,
            self.recommended_plugins(config),
            &self.providers,
        )?;

        unified.external =
            std::mem::take(&mut unified.external).with_packages(self.profile.runtime.iter().copied());
        for output in &mut unified.output {
            for (package, global) in self.profile.globals {
                output
                    .globals
                    .entry(package.to_string())
                    .or_insert_with(|| global.to_string());
            }
        }
        Ok(unified)
    }

    fn default_config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::default().with_library_type(self.profile.library_type);
        config.output.globals = self
            .profile
            .globals
            .iter()
            .map(|(package, global)| (package.to_string(), global.to_string()))
            .collect::<BTreeMap<_, _>>();
        config
    }

    fn recommended_plugins(&self, config: &BuilderConfig) -> Vec<PluginDescriptor> {
        let mut plugins = Vec::new();
        if let Some(compiler) = self.profile.compiler {
            let options = config
                .framework_options(compiler)
                .or_else(|| config.framework_options(self.profile.library_type.as_str()))
                .cloned()
                .unwrap_or_default();
            plugins.push(PluginDescriptor::new(compiler).with_options(options));
        }
        plugins.push(node_env_replacement(config));
        plugins
    }

    fn validate_config(&self, config: &BuilderConfig) -> StrategyValidation {
        let mut validation = validate_common(config);
        let manifest = Manifest::read(&config.root);
        let primary = self.profile.primary_package();

        if !manifest.declares(primary) {
            validation.warn(format!("package.json does not declare '{primary}'"));
        } else if manifest.dependencies.iter().any(|d| d == primary)
            && !manifest.peer_dependencies.iter().any(|d| d == primary)
        {
            validation.suggest(format!(
                "Move '{primary}' to peerDependencies so consumers provide it"
            ));
        }

        if let Some(compiler) = self.profile.compiler {
            if self.providers.get(compiler).is_none() {
                validation.warn(format!(
                    "No '{compiler}' plugin provider is registered; framework sources may not compile"
                ));
            }
        }
        validation
    }
}
