//! Bundler adapters.
//!
//! A [`BundlerAdapter`] builds a [`UnifiedConfig`] with one engine. Both
//! implementations share the same pipeline ([`driver`]): the config is split
//! into one [`FormatConfig`] per output format ([`plan`]), the format builds
//! run concurrently when there are at most [`PARALLEL_FORMAT_LIMIT`] of them,
//! and the emitted artifacts are decorated, enhanced and checked before a
//! [`BuildResult`] is assembled.
//!
//! Engines differ only in how one format is built:
//!
//! - [`RolldownAdapter`] runs rolldown in process and generates in memory.
//! - [`EsbuildAdapter`] drives the `esbuild` executable into a scratch
//!   directory and reads the metafile back.

mod driver;
mod esbuild;
#[cfg(test)]
pub(crate) mod fake;
mod plan;
mod rolldown;

pub use driver::PARALLEL_FORMAT_LIMIT;
pub use self::esbuild::EsbuildAdapter;
pub use plan::{FormatConfig, FormatPlan, WrapperEntry, plan_formats};
pub use self::rolldown::RolldownAdapter;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::{BundlerKind, OutputFormat};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::output::OutputArtifact;
use crate::plugins::UnifiedPlugin;
use crate::result::BuildResult;
use crate::unified::UnifiedConfig;
use crate::watch::BuildWatcher;

/// Capabilities an engine may or may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterFeature {
    Esm,
    Cjs,
    Umd,
    Iife,
    Sourcemap,
    Minify,
    Treeshake,
    CodeSplitting,
    PreserveModules,
    Globals,
    /// Hosting `resolve_id`/`load`/`transform` plugin hooks.
    PluginHooks,
    VirtualModules,
    Watch,
    Declarations,
}

impl AdapterFeature {
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Esm => AdapterFeature::Esm,
            OutputFormat::Cjs => AdapterFeature::Cjs,
            OutputFormat::Umd => AdapterFeature::Umd,
            OutputFormat::Iife => AdapterFeature::Iife,
        }
    }
}

impl fmt::Display for AdapterFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AdapterFeature::Esm => "ESM output",
            AdapterFeature::Cjs => "CommonJS output",
            AdapterFeature::Umd => "UMD output",
            AdapterFeature::Iife => "IIFE output",
            AdapterFeature::Sourcemap => "source maps",
            AdapterFeature::Minify => "minification",
            AdapterFeature::Treeshake => "tree shaking",
            AdapterFeature::CodeSplitting => "code splitting",
            AdapterFeature::PreserveModules => "preserved module structure",
            AdapterFeature::Globals => "output globals",
            AdapterFeature::PluginHooks => "in-process plugin hooks",
            AdapterFeature::VirtualModules => "virtual modules",
            AdapterFeature::Watch => "watch mode",
            AdapterFeature::Declarations => "type declaration output",
        };
        f.write_str(text)
    }
}

const ROLLDOWN_FEATURES: &[AdapterFeature] = &[
    AdapterFeature::Esm,
    AdapterFeature::Cjs,
    AdapterFeature::Umd,
    AdapterFeature::Iife,
    AdapterFeature::Sourcemap,
    AdapterFeature::Minify,
    AdapterFeature::Treeshake,
    AdapterFeature::CodeSplitting,
    AdapterFeature::PreserveModules,
    AdapterFeature::Globals,
    AdapterFeature::PluginHooks,
    AdapterFeature::VirtualModules,
    AdapterFeature::Watch,
];

const ESBUILD_FEATURES: &[AdapterFeature] = &[
    AdapterFeature::Esm,
    AdapterFeature::Cjs,
    AdapterFeature::Iife,
    AdapterFeature::Sourcemap,
    AdapterFeature::Minify,
    AdapterFeature::Treeshake,
    AdapterFeature::CodeSplitting,
    AdapterFeature::Watch,
];

/// Static capability map per engine.
pub fn engine_supports(kind: BundlerKind, feature: AdapterFeature) -> bool {
    match kind {
        BundlerKind::Rolldown => ROLLDOWN_FEATURES.contains(&feature),
        BundlerKind::Esbuild => ESBUILD_FEATURES.contains(&feature),
    }
}

/// Why an engine refused a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRejection {
    pub plugin: String,
    pub reason: String,
}

/// Plugins an engine accepted, and the ones it could not host.
#[derive(Debug, Default)]
pub struct PluginTransform {
    pub accepted: Vec<UnifiedPlugin>,
    pub rejected: Vec<PluginRejection>,
}

/// Artifacts of one format build, before enhancement.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub artifacts: Vec<OutputArtifact>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait BundlerAdapter: Send + Sync {
    fn kind(&self) -> BundlerKind;

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        engine_supports(self.kind(), feature)
    }

    /// Split the config into per-format builds.
    fn plan(&self, config: &UnifiedConfig) -> Result<FormatPlan> {
        plan_formats(config, self.kind())
    }

    fn transform_plugins(&self, plugins: &[UnifiedPlugin]) -> PluginTransform;

    /// Build every planned format. Empty output is an error.
    async fn build(&self, config: &UnifiedConfig) -> Result<BuildResult>;

    /// Build one planned format.
    async fn build_format(
        &self,
        config: &UnifiedConfig,
        format: &FormatConfig,
        plugins: &[UnifiedPlugin],
    ) -> Result<EngineOutput>;

    /// Rebuild on source changes until the watcher is closed.
    fn watch(self: Arc<Self>, config: UnifiedConfig) -> Result<BuildWatcher>;

    async fn dispose(&self) {}
}

/// Adapter for `kind`. Fails when the engine cannot be located from `root`.
pub fn create_adapter(kind: BundlerKind, root: &Path) -> Result<Arc<dyn BundlerAdapter>> {
    Ok(match kind {
        BundlerKind::Rolldown => Arc::new(RolldownAdapter::new()),
        BundlerKind::Esbuild => Arc::new(EsbuildAdapter::locate(root)?),
    })
}
