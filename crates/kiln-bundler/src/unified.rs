//! Bundler-agnostic build configuration.
//!
//! Strategies produce a [`UnifiedConfig`] from a user's `BuilderConfig`;
//! adapters consume it. Entry globs are always expanded before a
//! `UnifiedConfig` exists.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::{BuildMode, BundlerKind, ExternalConfig, LibraryType, OutputFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::plugins::UnifiedPlugin;
use crate::{Error, Result};

/// Concrete entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnifiedInput {
    Single(PathBuf),
    Multiple(Vec<PathBuf>),
    Named(BTreeMap<String, PathBuf>),
}

impl UnifiedInput {
    pub fn len(&self) -> usize {
        match self {
            UnifiedInput::Single(_) => 1,
            UnifiedInput::Multiple(paths) => paths.len(),
            UnifiedInput::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_multi_entry(&self) -> bool {
        self.len() > 1
    }

    /// Entries as `(name, path)` pairs; unnamed entries are named by file stem.
    pub fn entries(&self) -> Vec<(String, PathBuf)> {
        match self {
            UnifiedInput::Single(path) => vec![(entry_name(path), path.clone())],
            UnifiedInput::Multiple(paths) => {
                paths.iter().map(|p| (entry_name(p), p.clone())).collect()
            }
            UnifiedInput::Named(map) => map
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        }
    }

    pub fn paths(&self) -> Vec<&Path> {
        match self {
            UnifiedInput::Single(path) => vec![path.as_path()],
            UnifiedInput::Multiple(paths) => paths.iter().map(PathBuf::as_path).collect(),
            UnifiedInput::Named(map) => map.values().map(PathBuf::as_path).collect(),
        }
    }
}

fn entry_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string())
}

pub type ExternalPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which import specifiers stay out of the bundle.
#[derive(Clone, Default)]
pub enum External {
    #[default]
    None,
    /// Exact package names; subpaths (`pkg/sub`) match too.
    List(Vec<String>),
    Pattern(Regex),
    Predicate(ExternalPredicate),
}

impl External {
    pub fn matches(&self, specifier: &str) -> bool {
        match self {
            External::None => false,
            External::List(names) => names.iter().any(|name| matches_package(name, specifier)),
            External::Pattern(regex) => regex.is_match(specifier),
            External::Predicate(predicate) => predicate(specifier),
        }
    }

    /// Add packages while keeping the current shape: lists grow, regexes gain
    /// an alternation branch, predicates are OR-composed.
    pub fn with_packages<I, S>(self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages: Vec<String> = packages.into_iter().map(Into::into).collect();
        if packages.is_empty() {
            return self;
        }

        match self {
            External::None => External::List(packages),
            External::List(mut names) => {
                for package in packages {
                    if !names.contains(&package) {
                        names.push(package);
                    }
                }
                External::List(names)
            }
            External::Pattern(regex) => {
                let added = packages
                    .iter()
                    .map(|p| format!("^{}(?:/.*)?$", regex::escape(p)))
                    .collect::<Vec<_>>()
                    .join("|");
                match Regex::new(&format!("(?:{})|{added}", regex.as_str())) {
                    Ok(combined) => External::Pattern(combined),
                    Err(_) => External::Predicate(Arc::new(move |id| {
                        regex.is_match(id) || packages.iter().any(|p| matches_package(p, id))
                    })),
                }
            }
            External::Predicate(predicate) => External::Predicate(Arc::new(move |id| {
                predicate(id) || packages.iter().any(|p| matches_package(p, id))
            })),
        }
    }

    /// Names when the policy is an explicit list.
    pub fn names(&self) -> Option<&[String]> {
        match self {
            External::List(names) => Some(names),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, External::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            External::None => "none",
            External::List(_) => "list",
            External::Pattern(_) => "pattern",
            External::Predicate(_) => "predicate",
        }
    }
}

fn matches_package(name: &str, specifier: &str) -> bool {
    specifier == name
        || specifier
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            External::None => f.write_str("None"),
            External::List(names) => f.debug_tuple("List").field(names).finish(),
            External::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            External::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl TryFrom<&ExternalConfig> for External {
    type Error = Error;

    fn try_from(config: &ExternalConfig) -> Result<Self> {
        Ok(match config {
            ExternalConfig::List(names) => External::List(names.clone()),
            ExternalConfig::Pattern { regex } => {
                External::Pattern(Regex::new(regex).map_err(|e| Error::Config {
                    message: format!("Invalid external regex '{regex}': {e}"),
                    suggestion: Some("Check the regex syntax of `external.regex`".to_string()),
                })?)
            }
            ExternalConfig::Object(map) => External::List(map.keys().cloned().collect()),
        })
    }
}

/// Module format the consuming package declares (`package.json` `type`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    CommonJs,
    Module,
}

impl PackageType {
    /// Read the `type` field of `<root>/package.json`, defaulting to CommonJS.
    pub fn detect(root: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(root.join("package.json")) else {
            return PackageType::CommonJs;
        };
        let is_module = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "module"))
            .unwrap_or(false);
        if is_module {
            PackageType::Module
        } else {
            PackageType::CommonJs
        }
    }
}

/// One output target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedOutputConfig {
    pub format: OutputFormat,
    /// Base output directory; format subdirectories are added by adapters.
    pub dir: PathBuf,
    /// Single-file output name, overriding the entry template.
    pub file: Option<String>,
    /// Global name for UMD/IIFE.
    pub name: Option<String>,
    pub entry_file_names: Option<String>,
    pub chunk_file_names: Option<String>,
    pub sourcemap: bool,
    pub globals: BTreeMap<String, String>,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub intro: Option<String>,
    pub outro: Option<String>,
    pub preserve_modules: Option<bool>,
}

impl UnifiedOutputConfig {
    pub fn new(format: OutputFormat, dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            dir: dir.into(),
            file: None,
            name: None,
            entry_file_names: None,
            chunk_file_names: None,
            sourcemap: false,
            globals: BTreeMap::new(),
            banner: None,
            footer: None,
            intro: None,
            outro: None,
            preserve_modules: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnifiedConfig {
    pub cwd: PathBuf,
    pub input: UnifiedInput,
    pub output: Vec<UnifiedOutputConfig>,
    pub external: External,
    pub plugins: Vec<UnifiedPlugin>,
    pub treeshake: bool,
    pub minify: bool,
    pub sourcemap: bool,
    pub watch: bool,
    pub force_multi_entry: bool,
    pub strict: bool,
    pub dts: bool,
    pub mode: BuildMode,
    pub library_type: LibraryType,
    pub bundler: BundlerKind,
    pub package_type: PackageType,
    /// Non-fatal notes collected while producing this config.
    pub warnings: Vec<String>,
}

impl UnifiedConfig {
    pub fn new(cwd: impl Into<PathBuf>, input: UnifiedInput) -> Self {
        let cwd = cwd.into();
        let package_type = PackageType::detect(&cwd);
        Self {
            output: vec![UnifiedOutputConfig::new(OutputFormat::Esm, cwd.join("dist"))],
            cwd,
            input,
            external: External::None,
            plugins: Vec::new(),
            treeshake: true,
            minify: false,
            sourcemap: false,
            watch: false,
            force_multi_entry: false,
            strict: false,
            dts: false,
            mode: BuildMode::default(),
            library_type: LibraryType::Typescript,
            bundler: BundlerKind::default(),
            package_type,
            warnings: Vec::new(),
        }
    }

    pub fn formats(&self) -> Vec<OutputFormat> {
        self.output.iter().map(|o| o.format).collect()
    }

    /// Base output directory of the first target.
    pub fn out_dir(&self) -> PathBuf {
        self.output
            .first()
            .map(|o| o.dir.clone())
            .unwrap_or_else(|| self.cwd.join("dist"))
    }
}
