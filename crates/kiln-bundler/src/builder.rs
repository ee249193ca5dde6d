//! The library build orchestrator.
//!
//! [`LibraryBuilder::build`] runs the full pipeline for one [`BuilderConfig`]:
//!
//! 1. optionally clean the output directory,
//! 2. detect the library type when the config leaves it unset,
//! 3. pick and check the strategy, turning the config into a [`UnifiedConfig`],
//! 4. build with the adapter for the requested engine,
//! 5. write the artifacts and enforce the size budget,
//! 6. hand the result to the [`PostBuildValidator`], when validation is on.
//!
//! Progress is published as [`BuilderEvent`]s. Builds on one builder never
//! overlap: a second call waits until the first one has finished.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::{BuilderConfig, BundlerKind, LibraryType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::adapter::{BundlerAdapter, create_adapter};
use crate::detect::{DetectionResult, DetectorOptions, LibraryTypeDetector};
use crate::output::writer::{clean_output_dir, write_artifacts};
use crate::plugins::PluginProviderRegistry;
use crate::report::enforce_size_limit;
use crate::result::{BuildResult, ValidationSummary};
use crate::strategy::{BuildStrategy, StrategyManager};
use crate::unified::UnifiedConfig;
use crate::watch::{BuildWatcher, WatchEvent};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 32;

/// Checks a finished build, typically by re-testing it in a sandbox.
#[async_trait]
pub trait PostBuildValidator: Send + Sync {
    async fn validate(&self, result: &BuildResult, config: &BuilderConfig) -> Result<ValidationSummary>;

    /// Drop caches and temporary state.
    async fn dispose(&self) {}
}

#[derive(Clone)]
pub struct BuilderOptions {
    pub detector: DetectorOptions,
    pub providers: Arc<PluginProviderRegistry>,
    pub validator: Option<Arc<dyn PostBuildValidator>>,
    /// Write artifacts to the output directory. Off for dry runs.
    pub write_output: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            detector: DetectorOptions::default(),
            providers: Arc::new(PluginProviderRegistry::new()),
            validator: None,
            write_output: true,
        }
    }
}

impl std::fmt::Debug for BuilderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderOptions")
            .field("detector", &self.detector)
            .field("providers", &self.providers)
            .field("validator", &self.validator.is_some())
            .field("write_output", &self.write_output)
            .finish()
    }
}

impl BuilderOptions {
    pub fn with_validator(mut self, validator: Arc<dyn PostBuildValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    #[default]
    Idle,
    Detecting,
    Configuring,
    Building,
    Validating,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub enum BuilderEvent {
    BuildStart { root: PathBuf },
    TypeDetected(DetectionResult),
    StrategySelected { strategy: String, library_type: LibraryType },
    BuildEnd(Box<BuildResult>),
    ValidationEnd(ValidationSummary),
    BuildError { code: &'static str, message: String },
}

pub struct LibraryBuilder {
    detector: LibraryTypeDetector,
    strategies: StrategyManager,
    adapter: Mutex<Option<Arc<dyn BundlerAdapter>>>,
    validator: Option<Arc<dyn PostBuildValidator>>,
    write_output: bool,
    state: RwLock<BuildState>,
    events: broadcast::Sender<BuilderEvent>,
    build_lock: Mutex<()>,
}

impl Default for LibraryBuilder {
    fn default() -> Self {
        Self::new(BuilderOptions::default())
    }
}

impl std::fmt::Debug for LibraryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryBuilder")
            .field("detector", &self.detector)
            .field("strategies", &self.strategies)
            .field("state", &self.state())
            .finish()
    }
}

impl LibraryBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            detector: LibraryTypeDetector::new(options.detector),
            strategies: StrategyManager::with_providers(options.providers),
            adapter: Mutex::new(None),
            validator: options.validator,
            write_output: options.write_output,
            state: RwLock::new(BuildState::Idle),
            events,
            build_lock: Mutex::new(()),
        }
    }

    /// Use `adapter` until a build asks for a different engine.
    pub fn with_adapter(self, adapter: Arc<dyn BundlerAdapter>) -> Self {
        Self {
            adapter: Mutex::new(Some(adapter)),
            ..self
        }
    }

    pub fn register_strategy(&mut self, strategy: impl BuildStrategy + 'static) {
        self.strategies.register(strategy);
    }

    pub fn strategies(&self) -> &StrategyManager {
        &self.strategies
    }

    pub fn detector(&self) -> &LibraryTypeDetector {
        &self.detector
    }

    pub fn state(&self) -> BuildState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuilderEvent> {
        self.events.subscribe()
    }

    pub async fn build(&self, config: BuilderConfig) -> Result<BuildResult> {
        let _guard = self.build_lock.lock().await;
        self.emit(BuilderEvent::BuildStart {
            root: config.root.clone(),
        });

        match self.run(config).await {
            Ok(result) => {
                self.set_state(BuildState::Done);
                self.emit(BuilderEvent::BuildEnd(Box::new(result.clone())));
                Ok(result)
            }
            Err(e) => {
                self.set_state(BuildState::Failed);
                warn!(code = e.code(), "Build failed: {e}");
                self.emit(BuilderEvent::BuildError {
                    code: e.code(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Build, then rebuild on source changes. Every successful rebuild is
    /// written to the output directory.
    pub async fn watch(&self, config: BuilderConfig) -> Result<BuildWatcher> {
        let _guard = self.build_lock.lock().await;
        let (_, unified, adapter) = self.prepare(config).await?;
        let out_dir = unified.out_dir();
        let watcher = adapter.watch(unified)?;

        if self.write_output {
            let mut events = watcher.on();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(WatchEvent::BuildEnd(result)) => {
                            if let Err(e) = write_artifacts(&result.outputs, &out_dir) {
                                warn!("Failed to write rebuilt output: {e}");
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Output writer lagged behind watch events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        Ok(watcher)
    }

    /// Release the adapter, the validator and the detection cache.
    pub async fn dispose(&self) {
        let _guard = self.build_lock.lock().await;
        if let Some(adapter) = self.adapter.lock().await.take() {
            adapter.dispose().await;
        }
        if let Some(validator) = &self.validator {
            validator.dispose().await;
        }
        self.detector.clear_cache();
        self.set_state(BuildState::Idle);
        debug!("Builder disposed");
    }

    async fn run(&self, config: BuilderConfig) -> Result<BuildResult> {
        if config.clean {
            clean_output_dir(&config.output_dir(), &config.root)?;
        }

        let (config, unified, adapter) = self.prepare(config).await?;
        let library_type = unified.library_type;
        let out_dir = unified.out_dir();

        self.set_state(BuildState::Building);
        let mut result = adapter.build(&unified).await?;
        result.library_type = library_type;

        if self.write_output {
            let written = write_artifacts(&result.outputs, &out_dir)?;
            debug!(files = written.len(), dir = %out_dir.display(), "Wrote artifacts");
        }
        if let Some(limit) = config.performance.size_limit {
            enforce_size_limit(&result, limit)?;
        }

        if config.validation.enabled {
            match &self.validator {
                Some(validator) => {
                    self.set_state(BuildState::Validating);
                    let summary = validator.validate(&result, &config).await?;
                    self.emit(BuilderEvent::ValidationEnd(summary.clone()));
                    if !summary.success {
                        result.warnings.push(format!(
                            "Validation {} failed {} stage(s)",
                            summary.validation_id,
                            summary.failed_stages()
                        ));
                        result.warnings.extend(summary.warnings.iter().cloned());
                    }
                    result.validation = Some(summary);
                }
                None => {
                    warn!("Validation is enabled but no validator is installed");
                    result
                        .warnings
                        .push("Validation skipped: no validator installed".to_string());
                }
            }
        }

        info!(
            build_id = %result.build_id,
            library_type = %library_type,
            files = result.outputs.len(),
            "Library build complete"
        );
        Ok(result)
    }

    /// Detect, select the strategy, unify the config and pick the adapter.
    async fn prepare(
        &self,
        mut config: BuilderConfig,
    ) -> Result<(BuilderConfig, UnifiedConfig, Arc<dyn BundlerAdapter>)> {
        let library_type = match config.library_type {
            Some(library_type) => library_type,
            None => {
                self.set_state(BuildState::Detecting);
                let detection = self.detector.detect(&config.root).await;
                let library_type = detection.library_type;
                self.emit(BuilderEvent::TypeDetected(detection));
                library_type
            }
        };
        config.library_type = Some(library_type);

        self.set_state(BuildState::Configuring);
        let strategy = self.strategies.get_strategy(library_type)?;
        if !strategy.is_applicable(&config) {
            return Err(Error::StrategyNotApplicable {
                strategy: strategy.name().to_string(),
                reason: format!("it does not handle {library_type} projects"),
            });
        }

        let validation = strategy.validate_config(&config);
        if !validation.valid {
            return Err(Error::Config {
                message: validation.errors.join("; "),
                suggestion: validation.suggestions.first().cloned(),
            });
        }
        self.emit(BuilderEvent::StrategySelected {
            strategy: strategy.name().to_string(),
            library_type,
        });

        let mut unified = strategy.apply_strategy(&config)?;
        unified.warnings.extend(validation.warnings);
        unified.bundler = config.bundler;

        let adapter = self.adapter_for(config.bundler, &config.root).await?;
        Ok((config, unified, adapter))
    }

    /// The adapter for `kind`, replacing (and disposing) one for another engine.
    async fn adapter_for(&self, kind: BundlerKind, root: &std::path::Path) -> Result<Arc<dyn BundlerAdapter>> {
        let mut slot = self.adapter.lock().await;
        if let Some(current) = slot.as_ref() {
            if current.kind() == kind {
                return Ok(Arc::clone(current));
            }
        }
        if let Some(previous) = slot.take() {
            debug!(from = %previous.kind(), to = %kind, "Swapping bundler adapter");
            previous.dispose().await;
        }
        let adapter = create_adapter(kind, root)?;
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    fn set_state(&self, state: BuildState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: BuilderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapter;
    use crate::result::StageOutcome;
    use kiln_config::OutputFormat;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"demo","dependencies":{}}"#,
        )
        .unwrap();
        dir
    }

    fn config(dir: &TempDir) -> BuilderConfig {
        BuilderConfig::new(dir.path())
            .with_input("src/index.ts")
            .with_formats([OutputFormat::Esm, OutputFormat::Cjs])
            .with_library_type(LibraryType::Typescript)
    }

    #[tokio::test]
    async fn builds_writes_and_reports_events() {
        let dir = project();
        let adapter = Arc::new(FakeAdapter::default());
        let builder = LibraryBuilder::default().with_adapter(adapter.clone());
        let mut events = builder.subscribe();

        let result = builder.build(config(&dir)).await.unwrap();
        assert_eq!(result.library_type, LibraryType::Typescript);
        assert!(dir.path().join("dist/es/index.js").is_file());
        assert!(dir.path().join("dist/cjs/index.js").is_file());
        assert_eq!(builder.state(), BuildState::Done);
        assert_eq!(adapter.builds.load(Ordering::SeqCst), 1);

        assert!(matches!(events.recv().await.unwrap(), BuilderEvent::BuildStart { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            BuilderEvent::StrategySelected { library_type: LibraryType::Typescript, .. }
        ));
        assert!(matches!(events.recv().await.unwrap(), BuilderEvent::BuildEnd(_)));
    }

    #[tokio::test]
    async fn detects_type_when_unset() {
        let dir = project();
        let builder = LibraryBuilder::default().with_adapter(Arc::new(FakeAdapter::default()));
        let mut events = builder.subscribe();

        let mut config = config(&dir);
        config.library_type = None;
        builder.build(config).await.unwrap();

        events.recv().await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), BuilderEvent::TypeDetected(_)));
    }

    #[tokio::test]
    async fn size_limit_fails_the_build() {
        let dir = project();
        let builder = LibraryBuilder::default().with_adapter(Arc::new(FakeAdapter::default()));
        let mut config = config(&dir);
        config.performance.size_limit = Some(1);

        let err = builder.build(config).await.unwrap_err();
        assert_eq!(err.code(), "SIZE_LIMIT_EXCEEDED");
        assert_eq!(builder.state(), BuildState::Failed);
    }

    #[tokio::test]
    async fn invalid_strategy_config_is_rejected() {
        let dir = project();
        let builder = LibraryBuilder::default().with_adapter(Arc::new(FakeAdapter::default()));
        let config = config(&dir).with_formats(Vec::<OutputFormat>::new());

        let err = builder.build(config).await.unwrap_err();
        assert!(err.is_config());
    }

    struct Verdict(bool);

    #[async_trait]
    impl PostBuildValidator for Verdict {
        async fn validate(&self, result: &BuildResult, _config: &BuilderConfig) -> Result<ValidationSummary> {
            Ok(ValidationSummary {
                validation_id: format!("v-{}", result.build_id),
                success: self.0,
                errors: if self.0 { Vec::new() } else { vec!["export 'b' missing".into()] },
                warnings: Vec::new(),
                stages: vec![StageOutcome::passed("exports")],
                cached: false,
                report: None,
            })
        }
    }

    #[tokio::test]
    async fn validation_summary_is_attached() {
        let dir = project();
        let options = BuilderOptions::default().with_validator(Arc::new(Verdict(false)));
        let builder = LibraryBuilder::new(options).with_adapter(Arc::new(FakeAdapter::default()));
        let mut config = config(&dir);
        config.validation.enabled = true;

        let result = builder.build(config).await.unwrap();
        let summary = result.validation.as_ref().unwrap();
        assert!(!summary.success);
        assert!(result.warnings.iter().any(|w| w.contains("export 'b' missing")));
    }

    #[tokio::test]
    async fn dispose_releases_the_adapter() {
        let dir = project();
        let adapter = Arc::new(FakeAdapter::default());
        let builder = LibraryBuilder::default().with_adapter(adapter.clone());
        builder.build(config(&dir)).await.unwrap();

        builder.dispose().await;
        assert_eq!(adapter.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(builder.state(), BuildState::Idle);
    }
}
