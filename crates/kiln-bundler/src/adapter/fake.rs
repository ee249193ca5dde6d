//! In-memory adapter for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kiln_config::{BundlerKind, OutputFormat};

use super::{BundlerAdapter, EngineOutput, FormatConfig, PluginTransform, driver};
use crate::Result;
use crate::output::OutputArtifact;
use crate::plugins::UnifiedPlugin;
use crate::result::BuildResult;
use crate::unified::UnifiedConfig;
use crate::watch::BuildWatcher;

type Produce = Box<dyn Fn(&FormatConfig) -> Vec<OutputArtifact> + Send + Sync>;

pub(crate) struct FakeAdapter {
    pub builds: AtomicUsize,
    pub format_builds: AtomicUsize,
    pub disposed: AtomicUsize,
    produce: Produce,
}

impl Default for FakeAdapter {
    /// One `index.js` entry chunk per format.
    fn default() -> Self {
        Self::new(|format| {
            let code = match format.format {
                OutputFormat::Cjs => "exports.a = 1;",
                _ => "export const a = 1;",
            };
            let mut chunk = OutputArtifact::chunk("index.js", format.format, code);
            chunk.is_entry = true;
            vec![chunk]
        })
    }
}

impl FakeAdapter {
    pub fn new(produce: impl Fn(&FormatConfig) -> Vec<OutputArtifact> + Send + Sync + 'static) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            format_builds: AtomicUsize::new(0),
            disposed: AtomicUsize::new(0),
            produce: Box::new(produce),
        }
    }
}

#[async_trait]
impl BundlerAdapter for FakeAdapter {
    fn kind(&self) -> BundlerKind {
        BundlerKind::Rolldown
    }

    fn transform_plugins(&self, plugins: &[UnifiedPlugin]) -> PluginTransform {
        PluginTransform {
            accepted: plugins.to_vec(),
            rejected: Vec::new(),
        }
    }

    async fn build(&self, config: &UnifiedConfig) -> Result<BuildResult> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        driver::drive(self, config).await
    }

    async fn build_format(
        &self,
        _config: &UnifiedConfig,
        format: &FormatConfig,
        _plugins: &[UnifiedPlugin],
    ) -> Result<EngineOutput> {
        self.format_builds.fetch_add(1, Ordering::SeqCst);
        Ok(EngineOutput {
            artifacts: (self.produce)(format),
            warnings: Vec::new(),
        })
    }

    fn watch(self: Arc<Self>, config: UnifiedConfig) -> Result<BuildWatcher> {
        BuildWatcher::start(self, config)
    }

    async fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}
