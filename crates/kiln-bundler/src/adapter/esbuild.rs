//! The `esbuild` executable as a bundling engine.
//!
//! Each format is built in its own scratch directory: esbuild writes the
//! bundle and a metafile there, and the metafile's `outputs` table tells us
//! which files were emitted, what they export and import, and which entry
//! they came from. The scratch directory is removed when the build returns.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln_config::{BundlerKind, OutputFormat};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{BundlerAdapter, EngineOutput, FormatConfig, PluginRejection, PluginTransform, driver};
use crate::output::OutputArtifact;
use crate::plugins::{HookKind, UnifiedPlugin};
use crate::result::BuildResult;
use crate::unified::{External, UnifiedConfig};
use crate::watch::BuildWatcher;
use crate::{Error, Result};

const OUT_DIR: &str = "out";
const METAFILE: &str = "meta.json";
const WRAPPER_FILE: &str = "kiln-multi-entry.js";

#[derive(Debug, Clone)]
pub struct EsbuildAdapter {
    binary: PathBuf,
    timeout: Duration,
}

/// Command line for one format, plus notes about options esbuild cannot honor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EsbuildArgs {
    pub args: Vec<String>,
    pub warnings: Vec<String>,
}

impl EsbuildAdapter {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Find `esbuild` in `node_modules/.bin` of `root` or any ancestor, then on `PATH`.
    pub fn locate(root: &Path) -> Result<Self> {
        let local = root
            .ancestors()
            .map(|dir| dir.join("node_modules").join(".bin").join("esbuild"))
            .find(|candidate| candidate.is_file());

        let binary = match local {
            Some(path) => path,
            None => which::which("esbuild").map_err(|_| Error::AdapterUnavailable {
                bundler: BundlerKind::Esbuild,
                reason: "no esbuild executable in node_modules/.bin or on PATH".to_string(),
            })?,
        };
        debug!(binary = %binary.display(), "Located esbuild");
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line building `format` into `<scratch>/out`.
    ///
    /// Runs with `scratch` as the working directory, so metafile paths are
    /// relative to it.
    pub fn transform_config(
        &self,
        config: &UnifiedConfig,
        format: &FormatConfig,
        scratch: &Path,
    ) -> EsbuildArgs {
        let mut out = EsbuildArgs::default();
        let args = &mut out.args;

        for (name, import) in &format.input {
            let path = match &format.wrapper {
                Some(wrapper) if wrapper.id == *import => {
                    scratch.join(WRAPPER_FILE).to_string_lossy().into_owned()
                }
                _ => import.clone(),
            };
            args.push(format!("{name}={path}"));
        }

        args.push("--bundle".to_string());
        args.push(format!("--format={}", esbuild_format(format.format)));
        args.push(format!("--outdir={OUT_DIR}"));
        args.push(format!("--metafile={METAFILE}"));
        args.push("--log-level=warning".to_string());
        args.push("--color=false".to_string());

        let (entry_names, extension) = split_template(&format.entry_file_names);
        let (chunk_names, _) = split_template(&format.chunk_file_names);
        args.push(format!("--entry-names={entry_names}"));
        args.push(format!("--chunk-names={chunk_names}"));
        if extension != "js" {
            args.push(format!("--out-extension:.js=.{extension}"));
        }

        if format.sourcemap {
            args.push("--sourcemap".to_string());
        }
        if config.minify {
            args.push("--minify".to_string());
        }
        if !config.treeshake {
            args.push("--tree-shaking=false".to_string());
        }
        if format.format == OutputFormat::Esm {
            args.push("--splitting".to_string());
        }
        if let (OutputFormat::Iife, Some(name)) = (format.format, &format.output.name) {
            args.push(format!("--global-name={name}"));
        }
        if format.format.is_single_file() && !format.output.globals.is_empty() {
            out.warnings.push(format!(
                "esbuild ignores output globals for {} builds; externals must exist at runtime",
                format.format.as_str().to_uppercase()
            ));
        }

        match &config.external {
            External::None => {}
            External::List(names) => {
                for name in names {
                    args.push(format!("--external:{name}"));
                    args.push(format!("--external:{name}/*"));
                }
            }
            other => {
                args.push("--packages=external".to_string());
                out.warnings.push(format!(
                    "esbuild cannot evaluate a {} external; every bare import is kept external",
                    other.kind()
                ));
            }
        }

        out
    }

    async fn run(&self, args: &[String], scratch: &Path) -> Result<Vec<String>> {
        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::AdapterUnavailable {
                bundler: BundlerKind::Esbuild,
                reason: format!("failed to start {}: {e}", self.binary.display()),
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::build(
                    format!("esbuild timed out after {}s", self.timeout.as_secs()),
                    None,
                )
            })?
            .map_err(|e| Error::build(format!("esbuild did not finish: {e}"), Some(Box::new(e))))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let log = parse_log(&stderr);
        if !output.status.success() {
            let message = if log.errors.is_empty() {
                stderr.trim().to_string()
            } else {
                log.errors.join("\n")
            };
            return Err(Error::build(message, None));
        }
        Ok(log.warnings)
    }
}

#[async_trait]
impl BundlerAdapter for EsbuildAdapter {
    fn kind(&self) -> BundlerKind {
        BundlerKind::Esbuild
    }

    /// Only `render_chunk` can run: the driver applies it after esbuild exits.
    fn transform_plugins(&self, plugins: &[UnifiedPlugin]) -> PluginTransform {
        let mut transform = PluginTransform::default();
        for plugin in plugins {
            let unhosted: Vec<String> = plugin
                .hooks()
                .iter()
                .filter(|hook| *hook != HookKind::RenderChunk)
                .map(|hook| hook.to_string())
                .collect();

            if !unhosted.is_empty() {
                transform.rejected.push(PluginRejection {
                    plugin: plugin.name().to_string(),
                    reason: format!(
                        "esbuild runs out of process and cannot call {} hooks",
                        unhosted.join("/")
                    ),
                });
            }
            if plugin.implements(HookKind::RenderChunk) {
                transform.accepted.push(plugin.clone());
            }
        }
        transform
    }

    async fn build(&self, config: &UnifiedConfig) -> Result<BuildResult> {
        driver::drive(self, config).await
    }

    async fn build_format(
        &self,
        config: &UnifiedConfig,
        format: &FormatConfig,
        _plugins: &[UnifiedPlugin],
    ) -> Result<EngineOutput> {
        let scratch = tempfile::Builder::new()
            .prefix("kiln-esbuild-")
            .tempdir()
            .map_err(|e| Error::fs(std::env::temp_dir(), "Failed to create scratch directory", e))?;

        if let Some(wrapper) = &format.wrapper {
            let path = scratch.path().join(WRAPPER_FILE);
            tokio::fs::write(&path, &wrapper.code)
                .await
                .map_err(|e| Error::fs(&path, "Failed to write wrapper entry", e))?;
        }

        let invocation = self.transform_config(config, format, scratch.path());
        debug!(format = %format.format, args = ?invocation.args, "Running esbuild");
        let mut warnings = invocation.warnings;
        warnings.extend(self.run(&invocation.args, scratch.path()).await?);

        let metafile_path = scratch.path().join(METAFILE);
        let raw = tokio::fs::read_to_string(&metafile_path)
            .await
            .map_err(|e| Error::fs(&metafile_path, "esbuild did not write a metafile", e))?;
        let metafile: Metafile = serde_json::from_str(&raw)?;

        let artifacts = collect_artifacts(scratch.path(), &metafile, format.format).await?;
        Ok(EngineOutput { artifacts, warnings })
    }

    fn watch(self: Arc<Self>, config: UnifiedConfig) -> Result<BuildWatcher> {
        BuildWatcher::start(self, config)
    }
}

fn esbuild_format(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Esm => "esm",
        OutputFormat::Cjs => "cjs",
        OutputFormat::Iife | OutputFormat::Umd => "iife",
    }
}

/// `[name].iife.js` → (`[name].iife`, `js`). esbuild templates carry no extension.
fn split_template(template: &str) -> (&str, &str) {
    match template.rsplit_once('.') {
        Some((stem, extension)) if !extension.contains(']') && !stem.is_empty() => {
            (stem, extension)
        }
        _ => (template, "js"),
    }
}

#[derive(Debug, Default)]
struct EsbuildLog {
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Pull `[ERROR]`/`[WARNING]` headlines out of esbuild's stderr.
fn parse_log(stderr: &str) -> EsbuildLog {
    let mut log = EsbuildLog::default();
    for line in stderr.lines() {
        if let Some((_, message)) = line.split_once("[ERROR] ") {
            log.errors.push(message.trim().to_string());
        } else if let Some((_, message)) = line.split_once("[WARNING] ") {
            log.warnings.push(message.trim().to_string());
        }
    }
    log
}

#[derive(Debug, Default, Deserialize)]
struct Metafile {
    #[serde(default)]
    outputs: BTreeMap<String, MetaOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaOutput {
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    exports: Vec<String>,
    #[serde(default)]
    imports: Vec<MetaImport>,
    #[serde(default)]
    inputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MetaImport {
    path: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    external: bool,
}

async fn collect_artifacts(
    scratch: &Path,
    metafile: &Metafile,
    format: OutputFormat,
) -> Result<Vec<OutputArtifact>> {
    let prefix = format!("{OUT_DIR}/");
    let dynamic_targets: HashSet<&str> = metafile
        .outputs
        .values()
        .flat_map(|output| output.imports.iter())
        .filter(|import| import.kind == "dynamic-import" && !import.external)
        .map(|import| import.path.as_str())
        .collect();

    let mut artifacts = Vec::with_capacity(metafile.outputs.len());
    for (key, meta) in &metafile.outputs {
        let normalized = key.replace('\\', "/");
        let Some(file_name) = normalized.strip_prefix(&prefix) else {
            warn!(output = %key, "Ignoring esbuild output outside the output directory");
            continue;
        };
        let path = scratch.join(&normalized);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fs(&path, "Failed to read esbuild output", e))?;

        let is_script = [".js", ".mjs", ".cjs"].iter().any(|ext| file_name.ends_with(ext));
        let mut artifact = if is_script {
            let code = String::from_utf8(bytes)
                .map_err(|e| Error::build(format!("{file_name} is not valid UTF-8"), Some(Box::new(e))))?;
            OutputArtifact::chunk(file_name, format, code)
        } else {
            OutputArtifact::asset(file_name, format, bytes)
        };

        if is_script {
            artifact.name = Path::new(file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
            artifact.is_entry = meta.entry_point.is_some();
            artifact.is_dynamic_entry = dynamic_targets.contains(normalized.as_str());
            artifact.exports = meta.exports.clone();
            artifact.imports = meta
                .imports
                .iter()
                .map(|import| {
                    import
                        .path
                        .strip_prefix(&prefix)
                        .unwrap_or(&import.path)
                        .to_string()
                })
                .collect();
            artifact.modules = meta.inputs.keys().cloned().collect();
        }
        artifacts.push(artifact);
    }
    Ok(artifacts)
}
