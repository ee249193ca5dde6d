//! Splitting a unified config into one build per output format.

use std::path::PathBuf;

use kiln_config::{BundlerKind, OutputFormat};
use path_clean::PathClean;
use tracing::warn;

use super::{AdapterFeature, engine_supports};
use crate::unified::{PackageType, UnifiedConfig, UnifiedOutputConfig};
use crate::{Error, Result};

/// Module id of the synthetic entry that re-exports every entry.
pub const WRAPPER_ID: &str = "kiln:multi-entry.js";

const WRAPPER_NAME: &str = "index";

/// An in-memory entry module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperEntry {
    pub id: String,
    pub code: String,
}

/// Everything an engine needs to build a single format.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    pub format: OutputFormat,
    /// Directory (under the output root) receiving this format.
    pub dir: PathBuf,
    pub entry_file_names: String,
    pub chunk_file_names: String,
    pub preserve_modules: bool,
    pub sourcemap: bool,
    /// `(name, absolute path or wrapper id)` pairs.
    pub input: Vec<(String, String)>,
    pub wrapper: Option<WrapperEntry>,
    pub output: UnifiedOutputConfig,
}

impl FormatConfig {
    /// Prefix for artifact file names, e.g. `es`.
    pub fn dir_name(&self) -> &'static str {
        self.format.dir_name()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatPlan {
    pub configs: Vec<FormatConfig>,
    pub skipped: Vec<OutputFormat>,
    pub warnings: Vec<String>,
}

impl FormatPlan {
    pub fn formats(&self) -> Vec<OutputFormat> {
        self.configs.iter().map(|c| c.format).collect()
    }
}

/// Plan the per-format builds of `config` for engine `kind`.
///
/// UMD and IIFE need a single entry: with several entries they are skipped
/// with a warning, or, when `force_multi_entry` is set, built from a wrapper
/// module re-exporting each entry as `entry0..N`.
pub fn plan_formats(config: &UnifiedConfig, kind: BundlerKind) -> Result<FormatPlan> {
    let mut plan = FormatPlan::default();
    let entries: Vec<(String, String)> = config
        .input
        .entries()
        .into_iter()
        .map(|(name, path)| {
            let absolute = if path.is_absolute() {
                path
            } else {
                config.cwd.join(path)
            };
            (name, absolute.clean().to_string_lossy().into_owned())
        })
        .collect();

    if entries.is_empty() {
        return Err(Error::config("No entry points to build"));
    }

    for output in &config.output {
        let format = output.format;
        let single_file = format.is_single_file();
        if single_file && entries.len() > 1 && !config.force_multi_entry {
            let message = format!(
                "Skipping {} output: {} entries cannot share one global bundle (set force_multi_entry to wrap them)",
                format.as_str().to_uppercase(),
                entries.len()
            );
            warn!("{message}");
            plan.warnings.push(message);
            plan.skipped.push(format);
            continue;
        }

        // Only formats that will actually be built need engine support.
        if !engine_supports(kind, AdapterFeature::for_format(format)) {
            return Err(Error::UnsupportedFeature {
                bundler: kind,
                feature: AdapterFeature::for_format(format).to_string(),
            });
        }

        let (input, wrapper) = if single_file && entries.len() > 1 {
            let wrapper = WrapperEntry {
                id: WRAPPER_ID.to_string(),
                code: wrapper_source(&entries),
            };
            (vec![(WRAPPER_NAME.to_string(), WRAPPER_ID.to_string())], Some(wrapper))
        } else {
            (entries.clone(), None)
        };

        let mut preserve_modules = output.preserve_modules.unwrap_or(!single_file);
        if preserve_modules && !engine_supports(kind, AdapterFeature::PreserveModules) {
            if output.preserve_modules == Some(true) {
                let message = format!(
                    "{kind} cannot preserve modules; {} output is bundled instead",
                    format.as_str().to_uppercase()
                );
                warn!("{message}");
                plan.warnings.push(message);
            }
            preserve_modules = false;
        }

        let extension = script_extension(format, config.package_type);
        let entry_file_names = output
            .entry_file_names
            .clone()
            .or_else(|| output.file.clone().filter(|_| single_file))
            .unwrap_or_else(|| default_entry_template(format, extension));
        let chunk_file_names = output
            .chunk_file_names
            .clone()
            .unwrap_or_else(|| format!("[name]-[hash].{extension}"));

        plan.configs.push(FormatConfig {
            format,
            dir: output.dir.join(format.dir_name()),
            entry_file_names,
            chunk_file_names,
            preserve_modules,
            sourcemap: output.sourcemap || config.sourcemap,
            input,
            wrapper,
            output: output.clone(),
        });
    }

    Ok(plan)
}

/// `.mjs`/`.cjs` when the format disagrees with the package's module type.
fn script_extension(format: OutputFormat, package_type: PackageType) -> &'static str {
    match (format, package_type) {
        (OutputFormat::Esm, PackageType::CommonJs) => "mjs",
        (OutputFormat::Cjs, PackageType::Module) => "cjs",
        _ => "js",
    }
}

fn default_entry_template(format: OutputFormat, extension: &str) -> String {
    match format {
        OutputFormat::Umd => "[name].umd.js".to_string(),
        OutputFormat::Iife => "[name].iife.js".to_string(),
        OutputFormat::Esm | OutputFormat::Cjs => format!("[name].{extension}"),
    }
}

fn wrapper_source(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(index, (_, path))| {
            let specifier = serde_json::to_string(path).unwrap_or_else(|_| format!("\"{path}\""));
            format!("export * as entry{index} from {specifier};\n")
        })
        .collect()
}
