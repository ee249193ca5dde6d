//! The post-build validation pipeline.
//!
//! [`Validator::run`] copies a finished build into a sandbox and walks the
//! stages of [`ValidationStage`] in order. Each check stage compares what the
//! source declares with what the bundle does; disabled stages are skipped and
//! count as passed. In strict mode the first stage with discrepancies aborts
//! the run with [`ValidateError::Discrepancy`] after the sandbox is removed.
//! Otherwise discrepancies are collected as warnings and `success` reflects
//! whether every check held.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_bundler::cache::{Cache, CacheStats, Lru};
use kiln_bundler::strategy::resolve_entries;
use kiln_bundler::{
    BuildResult, BuilderConfig, External, OutputArtifact, OutputFormat, PostBuildValidator,
    ValidationSummary,
};
use kiln_config::ValidationSettings;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::compare::{
    self, ApiComparison, BehaviorCase, ExportComparison, ImportComparison, PerformanceComparison,
};
use crate::env::{EnvironmentOptions, PackageEntries, TemporaryEnvironment, entry_name};
use crate::error::{Result, ValidateError};
use crate::extract::{self, Introspection};
use crate::process;
use crate::report::{IntegrationCheck, ValidationReport, ValidationStats};
use crate::runner::{TestCommand, TestRunResult, parse_test_output, read_manifest};
use crate::snapshot::{self, SnapshotDiff, SnapshotStore};
use crate::stage::{StageReport, ValidationStage};

/// Upper bound for a single `node` introspection.
const NODE_TIMEOUT: Duration = Duration::from_secs(30);

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Entries kept in the in-memory result cache.
    pub cache_capacity: usize,
    /// `node` executable; looked up on `PATH` when unset.
    pub node: Option<PathBuf>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 32,
            node: None,
        }
    }
}

/// Inputs of one validation run.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub build_result: &'a BuildResult,
    pub config: &'a BuilderConfig,
    pub temp_dir: PathBuf,
    pub validation_id: String,
    pub project_root: PathBuf,
    pub output_dir: PathBuf,
}

impl ValidationContext<'_> {
    pub fn settings(&self) -> &ValidationSettings {
        &self.config.validation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<TestRunResult>,
    pub report: ValidationReport,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
    pub timestamp: DateTime<Utc>,
    pub validation_id: String,
    /// Served from the cache without running any stage.
    pub cached: bool,
}

impl From<ValidationResult> for ValidationSummary {
    fn from(result: ValidationResult) -> Self {
        ValidationSummary {
            stages: result.report.stages.iter().map(Into::into).collect(),
            report: result.report.to_json().ok(),
            validation_id: result.validation_id,
            success: result.success,
            errors: result.errors,
            warnings: result.warnings,
            cached: result.cached,
        }
    }
}

/// Runs validations and remembers their results.
pub struct Validator {
    node: Option<PathBuf>,
    cache: Cache<String, ValidationResult, Lru<String>>,
    snapshots: Mutex<BTreeMap<PathBuf, Arc<SnapshotStore>>>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("node", &self.node)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorOptions::default())
    }
}

impl Validator {
    pub fn new(options: ValidatorOptions) -> Self {
        let node = options.node.or_else(process::find_node);
        if node.is_none() {
            warn!("node was not found on PATH; runtime checks will be skipped");
        }
        Self {
            node,
            cache: Cache::new(options.cache_capacity, Lru::default()),
            snapshots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn node(&self) -> Option<&Path> {
        self.node.as_deref()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Validate `result`, built from `config`.
    pub async fn run(&self, result: &BuildResult, config: &BuilderConfig) -> Result<ValidationResult> {
        let settings = &config.validation;
        let output_dir = config.output_dir();
        let key = settings.cache.then(|| cache_key(result, config, &output_dir));

        if let Some(key) = &key {
            if let Some(mut hit) = self.cache.get(key) {
                debug!(validation_id = %hit.validation_id, "Validation cache hit");
                hit.cached = true;
                return Ok(hit);
            }
        }

        let outcome = self.run_uncached(result, config, output_dir).await?;
        if let Some(key) = key {
            self.cache.insert(key, outcome.clone());
        }
        Ok(outcome)
    }

    async fn run_uncached(
        &self,
        result: &BuildResult,
        config: &BuilderConfig,
        output_dir: PathBuf,
    ) -> Result<ValidationResult> {
        let settings = &config.validation;
        let started = Instant::now();
        let validation_id = Uuid::new_v4().to_string();
        info!(%validation_id, build_id = %result.build_id, "Validating build");

        if result.entries().next().is_none() {
            return Err(ValidateError::InvalidInput("the build has no entry chunks".to_string()));
        }

        let mut run = Run::new(settings.strict);
        run.advance(ValidationStage::EnvironmentSetup);
        let mut env = TemporaryEnvironment::create(
            &config.root,
            &output_dir,
            EnvironmentOptions {
                test_patterns: settings.test_pattern.clone(),
                include_src: settings.include_src,
                keep: settings.keep_temp_files,
            },
        )?;
        let ctx = ValidationContext {
            build_result: result,
            config,
            temp_dir: env.path().to_path_buf(),
            validation_id: validation_id.clone(),
            project_root: config.root.canonicalize().unwrap_or_else(|_| config.root.clone()),
            output_dir,
        };

        let outcome = self.run_stages(&ctx, &env, &mut run).await;
        run.advance(ValidationStage::Cleanup);
        if let Err(error) = env.cleanup() {
            run.warnings.push(format!("cleanup: {error}"));
        }
        outcome?;
        run.advance(ValidationStage::Done);

        let duration_ms = started.elapsed().as_millis() as u64;
        let stats = ValidationStats::from_stages(&run.stages, duration_ms);
        let success = run.stages.iter().all(StageReport::is_success);
        let report = ValidationReport {
            validation_id: validation_id.clone(),
            build_id: result.build_id.clone(),
            project_root: ctx.project_root.display().to_string(),
            library_type: result.library_type,
            timestamp: Utc::now(),
            success,
            strict: settings.strict,
            stats,
            stages: run.stages,
            exports: run.exports,
            imports: run.imports,
            behavior: run.behavior,
            tests: run.tests.clone(),
            api: run.api,
            performance: run.performance,
            integration: run.integration,
            snapshot: run.snapshot,
            errors: Vec::new(),
            warnings: run.warnings.clone(),
        };
        info!(%validation_id, success, duration_ms, "Validation finished");

        Ok(ValidationResult {
            success,
            test_result: run.tests,
            timestamp: report.timestamp,
            report,
            errors: Vec::new(),
            warnings: run.warnings,
            stats,
            validation_id,
            cached: false,
        })
    }

    async fn run_stages(&self, ctx: &ValidationContext<'_>, env: &TemporaryEnvironment, run: &mut Run) -> Result<()> {
        let settings = ctx.settings();
        let toggles = &settings.stages;

        env.rewrite_manifest(&PackageEntries::from_result(ctx.build_result))?;
        self.prepare_dependencies(ctx, env, run).await;

        let entries = EntrySet::collect(ctx);
        let loads = match &self.node {
            Some(node) if needs_node(toggles) => load_all(node, &entries, ctx, env).await,
            _ => BTreeMap::new(),
        };

        run.advance(ValidationStage::ExportComparison);
        if toggles.exports {
            let report = self.export_stage(&entries, &loads, run);
            run.finish(report)?;
        } else {
            run.skip(ValidationStage::ExportComparison, None);
        }

        run.advance(ValidationStage::ImportComparison);
        if toggles.imports {
            let report = import_stage(ctx, env, &entries, run);
            run.finish(report)?;
        } else {
            run.skip(ValidationStage::ImportComparison, None);
        }

        run.advance(ValidationStage::BehaviorComparison);
        match (toggles.behavior, self.node.is_some()) {
            (false, _) => run.skip(ValidationStage::BehaviorComparison, None),
            (true, false) => run.skip(ValidationStage::BehaviorComparison, Some("node not found".into())),
            (true, true) => {
                let report = behavior_stage(&entries, &loads, run);
                run.finish(report)?;
            }
        }

        run.advance(ValidationStage::RuntimeValidation);
        if toggles.runtime {
            let report = runtime_stage(ctx, env, run).await;
            run.finish(report)?;
        } else {
            run.skip(ValidationStage::RuntimeValidation, None);
        }

        run.advance(ValidationStage::ApiCompatibility);
        match (toggles.api, self.node.is_some()) {
            (false, _) => run.skip(ValidationStage::ApiCompatibility, None),
            (true, false) => run.skip(ValidationStage::ApiCompatibility, Some("node not found".into())),
            (true, true) => {
                let report = api_stage(&entries, &loads, run);
                run.finish(report)?;
            }
        }

        run.advance(ValidationStage::PerformanceComparison);
        match (toggles.performance, &self.node) {
            (false, _) => run.skip(ValidationStage::PerformanceComparison, None),
            (true, None) => run.skip(ValidationStage::PerformanceComparison, Some("node not found".into())),
            (true, Some(node)) => {
                let report = performance_stage(node, ctx, &entries, &loads, run).await;
                run.finish(report)?;
            }
        }

        run.advance(ValidationStage::IntegrationTests);
        match (toggles.integration, &self.node) {
            (false, _) => run.skip(ValidationStage::IntegrationTests, None),
            (true, None) => run.skip(ValidationStage::IntegrationTests, Some("node not found".into())),
            (true, Some(node)) => {
                let report = integration_stage(node, env, &entries, &loads, run).await;
                run.finish(report)?;
            }
        }

        run.advance(ValidationStage::SnapshotTests);
        if toggles.snapshot {
            let report = self.snapshot_stage(ctx, run);
            run.finish(report)?;
        } else {
            run.skip(ValidationStage::SnapshotTests, None);
        }

        run.advance(ValidationStage::ReportGeneration);
        Ok(())
    }

    async fn prepare_dependencies(&self, ctx: &ValidationContext<'_>, env: &TemporaryEnvironment, run: &mut Run) {
        let settings = ctx.settings();
        if settings.install_dependencies {
            match env.install_dependencies(Duration::from_millis(settings.install_timeout_ms)).await {
                Ok(_) => return,
                Err(error) => {
                    warn!(%error, "Dependency installation failed; linking project node_modules");
                    run.warnings.push(format!("dependency installation failed: {error}"));
                }
            }
        }
        if let Err(error) = env.link_dependencies() {
            run.warnings.push(error.to_string());
        }
    }

    fn export_stage(
        &self,
        entries: &EntrySet,
        loads: &BTreeMap<(String, OutputFormat), Load>,
        run: &mut Run,
    ) -> StageReport {
        let mut discrepancies = Vec::new();
        let mut compared = 0;
        for entry in &entries.entries {
            let Some(source) = &entry.source_exports else {
                continue;
            };
            let Some(primary) = entry.primary() else {
                continue;
            };
            let bundle = match loads.get(&(entry.name.clone(), primary.format)) {
                Some(Load { outcome: Ok(introspection), .. }) => introspection.names(),
                // Without a loaded module fall back to the engine's export list.
                _ if self.node.is_none() || !primary.exports.is_empty() => {
                    primary.exports.iter().cloned().collect()
                }
                Some(Load { outcome: Err(error), .. }) => {
                    discrepancies.push(format!("{}: bundle failed to load: {error}", entry.name));
                    continue;
                }
                None => continue,
            };
            let comparison = compare::compare_exports(&entry.name, source, &bundle);
            discrepancies.extend(comparison.discrepancies());
            run.exports.push(comparison);
            compared += 1;
        }
        if compared == 0 && discrepancies.is_empty() {
            return StageReport::skipped(
                ValidationStage::ExportComparison,
                Some("no source entry could be matched to the bundle".into()),
            );
        }
        StageReport::checked(ValidationStage::ExportComparison, discrepancies)
    }

    fn snapshot_stage(&self, ctx: &ValidationContext<'_>, run: &mut Run) -> StageReport {
        let settings = ctx.settings();
        let store = self.snapshot_store(settings.snapshot_path.as_deref());
        let key = snapshot::snapshot_key(&ctx.project_root, ctx.build_result.library_type);
        let diff = match store.check(&key, snapshot::snapshot_of(ctx.build_result), settings.update_snapshots) {
            Ok(diff) => diff,
            Err(error) => {
                return StageReport::checked(ValidationStage::SnapshotTests, vec![error.to_string()]);
            }
        };

        let report = if diff.first_run {
            StageReport::checked(ValidationStage::SnapshotTests, Vec::new())
                .with_detail(format!("baseline recorded in {}", store.path().display()))
        } else if diff.updated {
            StageReport::checked(ValidationStage::SnapshotTests, Vec::new()).with_detail("baseline updated")
        } else {
            StageReport::checked(ValidationStage::SnapshotTests, diff.discrepancies())
        };
        run.snapshot = Some(diff);
        report
    }

    fn snapshot_store(&self, configured: Option<&Path>) -> Arc<SnapshotStore> {
        let probe = SnapshotStore::at(configured);
        let mut stores = self.snapshots.lock();
        stores
            .entry(probe.path().to_path_buf())
            .or_insert_with(|| Arc::new(probe))
            .clone()
    }
}

#[async_trait]
impl PostBuildValidator for Validator {
    async fn validate(&self, result: &BuildResult, config: &BuilderConfig) -> kiln_bundler::Result<ValidationSummary> {
        Ok(self.run(result, config).await?.into())
    }

    async fn dispose(&self) {
        self.cache.clear();
        self.snapshots.lock().clear();
    }
}

/// SHA-256 over build id, serialized config and output directory.
pub fn cache_key(result: &BuildResult, config: &BuilderConfig, output_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(result.build_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(config).unwrap_or_default());
    hasher.update([0u8]);
    hasher.update(output_dir.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

fn needs_node(toggles: &kiln_config::StageToggles) -> bool {
    toggles.exports || toggles.behavior || toggles.api || toggles.performance || toggles.integration
}

/// Stage bookkeeping for one run.
struct Run {
    strict: bool,
    current: ValidationStage,
    stages: Vec<StageReport>,
    warnings: Vec<String>,
    exports: Vec<ExportComparison>,
    imports: Option<ImportComparison>,
    behavior: Vec<BehaviorCase>,
    tests: Option<TestRunResult>,
    api: Vec<ApiComparison>,
    performance: Vec<PerformanceComparison>,
    integration: Vec<IntegrationCheck>,
    snapshot: Option<SnapshotDiff>,
    stage_started: Instant,
}

impl Run {
    fn new(strict: bool) -> Self {
        Self {
            strict,
            current: ValidationStage::Idle,
            stages: Vec::new(),
            warnings: Vec::new(),
            exports: Vec::new(),
            imports: None,
            behavior: Vec::new(),
            tests: None,
            api: Vec::new(),
            performance: Vec::new(),
            integration: Vec::new(),
            snapshot: None,
            stage_started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: ValidationStage) {
        debug_assert!(stage > self.current, "validation stages only advance");
        debug!(from = %self.current, to = %stage, "Validation stage");
        self.current = stage;
        self.stage_started = Instant::now();
    }

    fn skip(&mut self, stage: ValidationStage, reason: Option<String>) {
        self.stages.push(StageReport::skipped(stage, reason));
    }

    fn finish(&mut self, mut report: StageReport) -> Result<()> {
        report.duration_ms = self.stage_started.elapsed().as_millis() as u64;
        if !report.is_success() {
            if self.strict {
                return Err(ValidateError::Discrepancy {
                    stage: report.stage,
                    details: report.discrepancies,
                });
            }
            for discrepancy in &report.discrepancies {
                warn!(stage = %report.stage, "{discrepancy}");
                self.warnings.push(format!("{}: {discrepancy}", report.stage));
            }
        }
        self.stages.push(report);
        Ok(())
    }
}

/// One logical entry: its source file and its artifacts in every format.
#[derive(Debug)]
struct Entry {
    name: String,
    source: Option<PathBuf>,
    source_exports: Option<extract::SourceExports>,
    artifacts: Vec<OutputArtifact>,
}

impl Entry {
    /// The artifact that best represents the entry: ESM, then CJS, then anything.
    fn primary(&self) -> Option<&OutputArtifact> {
        [OutputFormat::Esm, OutputFormat::Cjs, OutputFormat::Umd, OutputFormat::Iife]
            .iter()
            .find_map(|format| self.artifacts.iter().find(|a| a.format == *format))
    }
}

#[derive(Debug)]
struct EntrySet {
    entries: Vec<Entry>,
    manifest: Option<Value>,
}

impl EntrySet {
    fn collect(ctx: &ValidationContext<'_>) -> Self {
        let root = &ctx.project_root;
        let sources: BTreeMap<String, PathBuf> = match resolve_entries(root, ctx.config.input.as_ref()) {
            Ok(input) => input
                .entries()
                .into_iter()
                .map(|(name, path)| {
                    let path = if path.is_absolute() { path } else { root.join(path) };
                    (name, path)
                })
                .collect(),
            Err(error) => {
                debug!(%error, "Source entries unavailable");
                BTreeMap::new()
            }
        };

        let mut grouped: BTreeMap<String, Vec<OutputArtifact>> = BTreeMap::new();
        for artifact in ctx.build_result.entries() {
            grouped.entry(entry_name(artifact)).or_default().push(artifact.clone());
        }

        let entries = grouped
            .into_iter()
            .map(|(name, artifacts)| {
                let source = sources.get(&name).cloned();
                let source_exports = source.as_deref().and_then(|p| extract::extract_source_exports(p).ok());
                Entry {
                    name,
                    source,
                    source_exports,
                    artifacts,
                }
            })
            .collect();

        Self {
            entries,
            manifest: read_manifest(root),
        }
    }
}

/// The result of loading one artifact with `node`.
#[derive(Debug)]
struct Load {
    outcome: std::result::Result<Introspection, String>,
    process_ms: u64,
}

async fn load_all(
    node: &Path,
    entries: &EntrySet,
    ctx: &ValidationContext<'_>,
    env: &TemporaryEnvironment,
) -> BTreeMap<(String, OutputFormat), Load> {
    let global = ctx.config.output.name.as_deref();
    let mut loads = BTreeMap::new();
    for entry in &entries.entries {
        for artifact in &entry.artifacts {
            let file = env.dist().join(&artifact.file_name);
            let load = introspect(node, &file, artifact.format, global, env.path()).await;
            loads.insert((entry.name.clone(), artifact.format), load);
        }
    }
    loads
}

async fn introspect(node: &Path, file: &Path, format: OutputFormat, global: Option<&str>, cwd: &Path) -> Load {
    let started = Instant::now();
    let script = extract::introspection_script(file, format, global);
    let outcome = process::node_json(node, &script, cwd, NODE_TIMEOUT)
        .await
        .map_err(|e| e.to_string())
        .and_then(|value| serde_json::from_value::<Introspection>(value).map_err(|e| e.to_string()));
    Load {
        outcome,
        process_ms: started.elapsed().as_millis() as u64,
    }
}

fn import_stage(ctx: &ValidationContext<'_>, env: &TemporaryEnvironment, entries: &EntrySet, run: &mut Run) -> StageReport {
    let root = &ctx.project_root;
    let mut source_files: BTreeSet<PathBuf> = entries.entries.iter().filter_map(|e| e.source.clone()).collect();
    for artifact in &ctx.build_result.outputs {
        for module in &artifact.modules {
            let path = Path::new(module);
            if path.is_file() && !module.contains("node_modules") {
                source_files.insert(path.to_path_buf());
            }
        }
    }
    if source_files.len() <= entries.entries.len() {
        let src = root.join("src");
        source_files.extend(
            WalkDir::new(&src)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| p.extension().and_then(|x| x.to_str()).is_some_and(|x| SOURCE_EXTENSIONS.contains(&x)))
                .filter(|p| !is_test_file(p)),
        );
    }
    if source_files.is_empty() {
        return StageReport::skipped(ValidationStage::ImportComparison, Some("no source files found".into()));
    }

    let source: BTreeSet<String> = source_files
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .flat_map(|code| extract::extract_imports(&code))
        .collect();
    let bundle: BTreeSet<String> = ctx
        .build_result
        .outputs
        .iter()
        .filter(|a| is_script(&a.file_name))
        .filter_map(|artifact| {
            artifact
                .code
                .clone()
                .or_else(|| std::fs::read_to_string(env.dist().join(&artifact.file_name)).ok())
        })
        .flat_map(|code| extract::extract_imports(&code))
        .collect();

    let configured = match ctx.config.external.as_ref().map(External::try_from) {
        Some(Ok(external)) => Some(external),
        Some(Err(error)) => {
            run.warnings.push(format!("import-comparison: {error}"));
            None
        }
        None => None,
    };
    let external = compare::expected_external(configured, entries.manifest.as_ref());
    let comparison = compare::compare_imports(&source, &bundle, &external, entries.manifest.as_ref());
    let report = StageReport::checked(ValidationStage::ImportComparison, comparison.discrepancies());
    run.imports = Some(comparison);
    report
}

fn is_script(file_name: &str) -> bool {
    [".js", ".mjs", ".cjs"].iter().any(|ext| file_name.ends_with(ext))
}

fn is_test_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.contains(".test.") || name.contains(".spec.") || path.components().any(|c| c.as_os_str() == "__tests__")
}

fn behavior_stage(entries: &EntrySet, loads: &BTreeMap<(String, OutputFormat), Load>, run: &mut Run) -> StageReport {
    let mut discrepancies = Vec::new();
    for entry in &entries.entries {
        let outcomes: Vec<(OutputFormat, std::result::Result<Introspection, String>)> = entry
            .artifacts
            .iter()
            .filter_map(|a| {
                loads
                    .get(&(entry.name.clone(), a.format))
                    .map(|load| (a.format, load.outcome.clone()))
            })
            .collect();
        let cases = compare::behavior_cases(&entry.name, &outcomes);
        discrepancies.extend(cases.iter().filter(|c| !c.passed).map(|c| {
            format!("{}: {} ({})", c.entry, c.name, c.detail.as_deref().unwrap_or("failed"))
        }));
        run.behavior.extend(cases);
    }
    let total = run.behavior.len();
    StageReport::checked(ValidationStage::BehaviorComparison, discrepancies).with_detail(format!("{total} case(s)"))
}

async fn runtime_stage(ctx: &ValidationContext<'_>, env: &TemporaryEnvironment, run: &mut Run) -> StageReport {
    let settings = ctx.settings();
    let Some(command) = TestCommand::resolve(env.path(), settings.test_command.as_deref()) else {
        return StageReport::skipped(ValidationStage::RuntimeValidation, Some("no test command".into()));
    };
    info!(command = %command.display(), "Running tests against the bundle");

    let limit = Duration::from_millis(settings.timeout_ms);
    let output = match process::run(&command.program, &command.args, env.path(), limit).await {
        Ok(output) => output,
        Err(error) => {
            return StageReport::checked(
                ValidationStage::RuntimeValidation,
                vec![format!("tests could not run: {error}")],
            );
        }
    };

    let result = parse_test_output(
        &output.combined(),
        command.framework,
        output.success,
        output.duration.as_millis() as u64,
    );
    let mut discrepancies: Vec<String> = result
        .tests
        .iter()
        .filter(|t| t.status == crate::runner::TestStatus::Failed)
        .map(|t| format!("test failed: {}", t.name))
        .collect();
    if !result.success && discrepancies.is_empty() {
        discrepancies.push(match output.code {
            Some(code) => format!("'{}' exited with code {code}", command.display()),
            None => format!("'{}' was terminated", command.display()),
        });
    }
    let detail = format!("{} passed, {} failed, {} skipped", result.passed, result.failed, result.skipped);
    run.tests = Some(result);
    StageReport::checked(ValidationStage::RuntimeValidation, discrepancies).with_detail(detail)
}

fn api_stage(entries: &EntrySet, loads: &BTreeMap<(String, OutputFormat), Load>, run: &mut Run) -> StageReport {
    let mut breaking = Vec::new();
    for entry in &entries.entries {
        let (Some(source_path), Some(source), Some(primary)) = (&entry.source, &entry.source_exports, entry.primary())
        else {
            continue;
        };
        let Some(Load { outcome: Ok(bundle), .. }) = loads.get(&(entry.name.clone(), primary.format)) else {
            continue;
        };
        let code = std::fs::read_to_string(source_path).unwrap_or_default();
        let signatures = extract::extract_signatures(&code);
        let deprecated = extract::deprecated_exports(&code);
        let api = compare::compare_api(&entry.name, source, &signatures, &deprecated, bundle);
        for name in &api.deprecated {
            run.warnings.push(format!("api-compatibility: '{name}' is deprecated"));
        }
        breaking.extend(api.breaking.iter().cloned());
        run.api.push(api);
    }
    if run.api.is_empty() {
        return StageReport::skipped(ValidationStage::ApiCompatibility, Some("no loadable entry with a source".into()));
    }
    StageReport::checked(ValidationStage::ApiCompatibility, breaking)
}

async fn performance_stage(
    node: &Path,
    ctx: &ValidationContext<'_>,
    entries: &EntrySet,
    loads: &BTreeMap<(String, OutputFormat), Load>,
    run: &mut Run,
) -> StageReport {
    let package_is_module = entries
        .manifest
        .as_ref()
        .and_then(|m| m.get("type"))
        .and_then(Value::as_str)
        == Some("module");

    for entry in &entries.entries {
        let Some(primary) = entry.primary() else { continue };
        let Some(Load { outcome: Ok(bundle), process_ms }) = loads.get(&(entry.name.clone(), primary.format)) else {
            continue;
        };

        // Only plain JavaScript sources can be loaded without a transpiler.
        let source_format = entry
            .source
            .as_deref()
            .and_then(|p| p.extension().and_then(|e| e.to_str()).map(|e| (p, e)))
            .and_then(|(p, ext)| match ext {
                "mjs" => Some((p, OutputFormat::Esm)),
                "cjs" => Some((p, OutputFormat::Cjs)),
                "js" if package_is_module => Some((p, OutputFormat::Esm)),
                "js" => Some((p, OutputFormat::Cjs)),
                _ => None,
            });
        let source = match source_format {
            Some((path, format)) => introspect(node, path, format, None, &ctx.project_root).await.outcome.ok(),
            None => None,
        };
        run.performance
            .push(compare::compare_performance(&entry.name, bundle, *process_ms, source.as_ref()));
    }

    if run.performance.is_empty() {
        return StageReport::skipped(ValidationStage::PerformanceComparison, Some("no loadable entry".into()));
    }
    let detail = run
        .performance
        .iter()
        .map(PerformanceComparison::summary)
        .collect::<Vec<_>>()
        .join("; ");
    StageReport::advisory(ValidationStage::PerformanceComparison, detail)
}

async fn integration_stage(
    node: &Path,
    env: &TemporaryEnvironment,
    entries: &EntrySet,
    loads: &BTreeMap<(String, OutputFormat), Load>,
    run: &mut Run,
) -> StageReport {
    for entry in &entries.entries {
        for artifact in &entry.artifacts {
            let Some(load) = loads.get(&(entry.name.clone(), artifact.format)) else {
                continue;
            };
            run.integration.push(IntegrationCheck {
                target: artifact.file_name.clone(),
                passed: load.outcome.is_ok(),
                detail: load.outcome.as_ref().err().cloned(),
            });
        }
    }

    let name = entries
        .manifest
        .as_ref()
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(name) = name {
        let has = |format: OutputFormat| entries.entries.iter().any(|e| e.artifacts.iter().any(|a| a.format == format));
        let specifier = serde_json::to_string(&name).unwrap_or_default();
        let mut probes = Vec::new();
        if has(OutputFormat::Esm) {
            probes.push((format!("import {name}"), "kiln-self-reference.mjs", format!("import {specifier};\n")));
        }
        if has(OutputFormat::Cjs) {
            probes.push((format!("require {name}"), "kiln-self-reference.cjs", format!("require({specifier});\n")));
        }
        for (target, file, script) in probes {
            let detail = self_reference(node, env.path(), file, &script).await.err();
            run.integration.push(IntegrationCheck {
                target,
                passed: detail.is_none(),
                detail,
            });
        }
    }

    if run.integration.is_empty() {
        return StageReport::skipped(ValidationStage::IntegrationTests, Some("nothing to load".into()));
    }
    let discrepancies = run
        .integration
        .iter()
        .filter(|check| !check.passed)
        .map(|check| format!("{} failed: {}", check.target, check.detail.as_deref().unwrap_or("unknown error")))
        .collect();
    StageReport::checked(ValidationStage::IntegrationTests, discrepancies)
}

/// Resolve the package by its own name from inside the sandbox, the way a consumer would.
async fn self_reference(node: &Path, sandbox: &Path, file: &str, script: &str) -> std::result::Result<(), String> {
    let script_path = sandbox.join(file);
    std::fs::write(&script_path, script).map_err(|e| e.to_string())?;
    let run = process::run(node, &[script_path.to_string_lossy().into_owned()], sandbox, NODE_TIMEOUT).await;
    if let Err(error) = std::fs::remove_file(&script_path) {
        debug!(path = %script_path.display(), %error, "Could not remove self-reference script");
    }
    let output = run.map_err(|e| e.to_string())?;
    if output.success {
        Ok(())
    } else {
        Err(output
            .stderr
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("Error") || line.contains("Error:"))
            .unwrap_or("exited with a non-zero status")
            .to_string())
    }
}
