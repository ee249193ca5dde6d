//! In-process rolldown engine.

use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::{BundlerKind, OutputFormat};
use rolldown::{
    BundlerBuilder, BundlerOptions, GlobalsOutputOption, InputItem, RawMinifyOptions,
    SourceMapType,
};
use rolldown_common::{Output, StrOrBytes, TreeshakeOptions};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{BundlerAdapter, EngineOutput, FormatConfig, PluginTransform, driver};
use crate::diagnostics;
use crate::output::OutputArtifact;
use crate::plugins::rolldown::{BridgePlugin, ExternalPlugin, VirtualEntryPlugin};
use crate::plugins::{PluginPhase, PluginRegistry, UnifiedPlugin};
use crate::result::BuildResult;
use crate::unified::UnifiedConfig;
use crate::watch::BuildWatcher;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct RolldownAdapter;

impl RolldownAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Rolldown options for one planned format.
    pub fn transform_config(&self, config: &UnifiedConfig, format: &FormatConfig) -> BundlerOptions {
        let mut options = BundlerOptions {
            input: Some(
                format
                    .input
                    .iter()
                    .map(|(name, import)| InputItem {
                        name: Some(name.clone()),
                        import: import.clone(),
                    })
                    .collect(),
            ),
            cwd: Some(config.cwd.clone()),
            format: Some(match format.format {
                OutputFormat::Esm => rolldown::OutputFormat::Esm,
                OutputFormat::Cjs => rolldown::OutputFormat::Cjs,
                OutputFormat::Umd => rolldown::OutputFormat::Umd,
                OutputFormat::Iife => rolldown::OutputFormat::Iife,
            }),
            entry_filenames: Some(format.entry_file_names.clone().into()),
            chunk_filenames: Some(format.chunk_file_names.clone().into()),
            sourcemap: format.sourcemap.then_some(SourceMapType::File),
            minify: config.minify.then(|| RawMinifyOptions::from(true)),
            treeshake: TreeshakeOptions::Boolean(config.treeshake),
            preserve_modules: Some(format.preserve_modules),
            name: format.output.name.clone(),
            ..Default::default()
        };

        if format.format.is_single_file() && !format.output.globals.is_empty() {
            let globals: FxHashMap<String, String> = format
                .output
                .globals
                .iter()
                .map(|(package, global)| (package.clone(), global.clone()))
                .collect();
            options.globals = Some(GlobalsOutputOption::from(globals));
        }
        options
    }

    fn plugin_registry(
        &self,
        config: &UnifiedConfig,
        format: &FormatConfig,
        plugins: &[UnifiedPlugin],
    ) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        if let Some(wrapper) = &format.wrapper {
            registry.add(
                VirtualEntryPlugin::new(wrapper.id.clone(), wrapper.code.clone()),
                PluginPhase::Virtual,
            );
        }
        if !config.external.is_none() {
            registry.add(ExternalPlugin::new(config.external.clone()), PluginPhase::Resolve);
        }
        for plugin in plugins.iter().filter(|p| BridgePlugin::hosts_any(p)) {
            registry.add(BridgePlugin::new(plugin.clone()), plugin.phase());
        }
        registry
    }
}

#[async_trait]
impl BundlerAdapter for RolldownAdapter {
    fn kind(&self) -> BundlerKind {
        BundlerKind::Rolldown
    }

    /// Every hook is hosted: resolve/load/transform in rolldown, render_chunk
    /// by the driver.
    fn transform_plugins(&self, plugins: &[UnifiedPlugin]) -> PluginTransform {
        PluginTransform {
            accepted: plugins.to_vec(),
            rejected: Vec::new(),
        }
    }

    async fn build(&self, config: &UnifiedConfig) -> Result<BuildResult> {
        driver::drive(self, config).await
    }

    async fn build_format(
        &self,
        config: &UnifiedConfig,
        format: &FormatConfig,
        plugins: &[UnifiedPlugin],
    ) -> Result<EngineOutput> {
        let options = self.transform_config(config, format);
        let registry = self.plugin_registry(config, format, plugins);
        debug!(format = %format.format, plugins = registry.len(), "Starting rolldown");

        let mut bundler = BundlerBuilder::default()
            .with_options(options)
            .with_plugins(registry.into_rolldown_plugins())
            .build()
            .map_err(|e| Error::from_rolldown_batch(&e))?;

        let bundle = bundler
            .generate()
            .await
            .map_err(|e| Error::from_rolldown_batch(&e))?;

        let mut artifacts = Vec::with_capacity(bundle.assets.len());
        let mut maps = Vec::new();
        for output in &bundle.assets {
            match output {
                Output::Chunk(chunk) => {
                    let file_name = chunk.filename.to_string();
                    let mut artifact =
                        OutputArtifact::chunk(file_name.clone(), format.format, chunk.code.clone());
                    artifact.name = Some(chunk.name.to_string());
                    artifact.is_entry = chunk.is_entry;
                    artifact.is_dynamic_entry = chunk.is_dynamic_entry;
                    artifact.imports = chunk.imports.iter().map(|s| s.to_string()).collect();
                    artifact.exports = chunk.exports.iter().map(|s| s.to_string()).collect();
                    artifact.modules = chunk.module_ids.iter().map(|id| id.to_string()).collect();

                    if let Some(map) = &chunk.map {
                        let map_name = chunk
                            .sourcemap_filename
                            .clone()
                            .unwrap_or_else(|| format!("{file_name}.map"));
                        maps.push((map_name, map.to_json_string()));
                    }
                    artifacts.push(artifact);
                }
                Output::Asset(asset) => {
                    let source = match &asset.source {
                        StrOrBytes::Str(text) => text.clone().into_bytes(),
                        StrOrBytes::Bytes(bytes) => bytes.clone(),
                    };
                    artifacts.push(OutputArtifact::asset(
                        asset.filename.to_string(),
                        format.format,
                        source,
                    ));
                }
            }
        }

        for (map_name, json) in maps {
            if !artifacts.iter().any(|a| a.file_name == map_name) {
                artifacts.push(OutputArtifact::asset(map_name, format.format, json.into_bytes()));
            }
        }

        let warnings = bundle
            .warnings
            .iter()
            .map(|w| diagnostics::extract_message(&format!("{w:?}")))
            .collect();

        Ok(EngineOutput { artifacts, warnings })
    }

    fn watch(self: Arc<Self>, config: UnifiedConfig) -> Result<BuildWatcher> {
        BuildWatcher::start(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::plan_formats;
    use crate::unified::{External, UnifiedInput, UnifiedOutputConfig};
    use std::path::PathBuf;

    fn config() -> UnifiedConfig {
        let mut config =
            UnifiedConfig::new("/project", UnifiedInput::Single(PathBuf::from("src/index.ts")));
        let mut umd = UnifiedOutputConfig::new(OutputFormat::Umd, "/project/dist");
        umd.name = Some("myLib".into());
        umd.globals.insert("react".into(), "React".into());
        let mut esm = UnifiedOutputConfig::new(OutputFormat::Esm, "/project/dist");
        esm.sourcemap = true;
        config.output = vec![esm, umd];
        config.external = External::List(vec!["react".into()]);
        config
    }

    #[test]
    fn options_follow_the_format_plan() {
        let config = config();
        let plan = plan_formats(&config, BundlerKind::Rolldown).unwrap();
        let adapter = RolldownAdapter::new();

        let esm = adapter.transform_config(&config, &plan.configs[0]);
        let input = esm.input.as_ref().unwrap();
        assert_eq!(input[0].name.as_deref(), Some("index"));
        assert_eq!(input[0].import, "/project/src/index.ts");
        assert_eq!(esm.preserve_modules, Some(true));
        assert!(matches!(esm.sourcemap, Some(SourceMapType::File)));
        assert!(esm.globals.is_none());

        let umd = adapter.transform_config(&config, &plan.configs[1]);
        assert_eq!(umd.name.as_deref(), Some("myLib"));
        assert_eq!(umd.preserve_modules, Some(false));
        assert!(umd.globals.is_some());
        assert!(umd.sourcemap.is_none());
    }

    #[test]
    fn registry_holds_external_and_wrapper_plugins() {
        let mut config = config();
        config.input = UnifiedInput::Multiple(vec![PathBuf::from("src/a.ts"), PathBuf::from("src/b.ts")]);
        config.force_multi_entry = true;
        let plan = plan_formats(&config, BundlerKind::Rolldown).unwrap();

        let adapter = RolldownAdapter::new();
        assert_eq!(adapter.plugin_registry(&config, &plan.configs[0], &[]).len(), 1);
        assert_eq!(adapter.plugin_registry(&config, &plan.configs[1], &[]).len(), 2);
    }
}
