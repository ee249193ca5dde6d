//! Isolated sandboxes for validating a build.
//!
//! A sandbox is a fresh temporary directory laid out like a consumer install
//! of the package: the build output under `dist/`, a `package.json` whose entry
//! fields point into `dist/`, the project's lockfiles and test configuration,
//! and its test files. The original project is never touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use kiln_bundler::{BuildResult, OutputArtifact, OutputFormat};
use serde_json::{Map, Value, json};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, ValidateError};
use crate::process::{self, ProcessOutput};
use crate::runner::{PackageManager, read_manifest};

const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "bun.lockb",
    "bun.lock",
    ".npmrc",
];

/// File name prefixes of root-level test runner configuration.
const TEST_CONFIG_PREFIXES: &[&str] = &[
    "jest.config.",
    "vitest.config.",
    "vitest.workspace.",
    "vite.config.",
    ".mocharc",
    ".taprc",
    "tsconfig",
    "babel.config.",
    ".babelrc",
];

const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".kiln"];

#[derive(Debug, Clone, Default)]
pub struct EnvironmentOptions {
    /// Globs relative to the project root selecting test files.
    pub test_patterns: Vec<String>,
    pub include_src: bool,
    /// Leave the directory on disk after cleanup.
    pub keep: bool,
}

/// Where a package's entry points live inside the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageEntries {
    /// Export subpath (`"."`, `"./utils"`) to per-condition target.
    pub exports: BTreeMap<String, EntryTargets>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTargets {
    pub import: Option<String>,
    pub require: Option<String>,
}

impl PackageEntries {
    /// Entry chunks of `result`, addressed relative to the sandbox root.
    pub fn from_result(result: &BuildResult) -> Self {
        let mut exports: BTreeMap<String, EntryTargets> = BTreeMap::new();
        for artifact in result.entries() {
            let target = format!("./dist/{}", artifact.file_name);
            let subpath = match entry_name(artifact).as_str() {
                "index" | "main" => ".".to_string(),
                name => format!("./{name}"),
            };
            let slot = exports.entry(subpath).or_default();
            match artifact.format {
                OutputFormat::Esm => {
                    slot.import.get_or_insert(target);
                }
                OutputFormat::Cjs => {
                    slot.require = Some(target);
                }
                // UMD only stands in for a missing CJS build.
                OutputFormat::Umd => {
                    slot.require.get_or_insert(target);
                }
                OutputFormat::Iife => {}
            }
        }
        Self { exports }
    }

    fn root(&self) -> Option<&EntryTargets> {
        self.exports
            .get(".")
            .or_else(|| self.exports.values().next())
    }
}

/// Logical entry name: the chunk name, else the file stem up to the first dot.
pub fn entry_name(artifact: &OutputArtifact) -> String {
    if let Some(name) = &artifact.name {
        return name.clone();
    }
    let base = artifact
        .file_name
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or(&artifact.file_name);
    base.split('.').next().unwrap_or(base).to_string()
}

/// A sandbox directory. Removed on [`cleanup`](Self::cleanup) or drop unless kept.
#[derive(Debug)]
pub struct TemporaryEnvironment {
    dir: Option<TempDir>,
    path: PathBuf,
    project_root: PathBuf,
    keep: bool,
}

impl TemporaryEnvironment {
    pub fn create(project_root: &Path, output_dir: &Path, options: EnvironmentOptions) -> Result<Self> {
        if !output_dir.is_dir() {
            return Err(ValidateError::InvalidInput(format!(
                "output directory {} does not exist",
                output_dir.display()
            )));
        }

        let project_root = &project_root.canonicalize().unwrap_or_else(|_| project_root.to_path_buf());
        let output_dir = &output_dir.canonicalize().unwrap_or_else(|_| output_dir.to_path_buf());

        let dir = tempfile::Builder::new()
            .prefix("kiln-validate-")
            .tempdir()
            .map_err(|e| ValidateError::env(std::env::temp_dir(), "Failed to create sandbox", e))?;
        let env = Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            project_root: project_root.to_path_buf(),
            keep: options.keep,
        };
        info!(sandbox = %env.path.display(), "Creating validation sandbox");

        let dist = env.path.join("dist");
        let copied = copy_tree(output_dir, &dist, |_| true)?;
        debug!(files = copied, "Copied build output");
        mark_module_kinds(&dist)?;

        for name in LOCKFILES.iter().chain(std::iter::once(&"package.json")) {
            env.copy_root_file(name)?;
        }
        for entry in fs::read_dir(project_root).map_err(|e| ValidateError::env(project_root, "Failed to read project", e))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_file() && TEST_CONFIG_PREFIXES.iter().any(|p| name.starts_with(p)) {
                env.copy_root_file(&name)?;
            }
        }

        let tests = env.copy_test_files(output_dir, &options.test_patterns)?;
        debug!(files = tests, "Copied test files");

        if options.include_src {
            let src = project_root.join("src");
            if src.is_dir() {
                copy_tree(&src, &env.path.join("src"), |_| true)?;
            }
        }
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dist(&self) -> PathBuf {
        self.path.join("dist")
    }

    fn copy_root_file(&self, name: &str) -> Result<()> {
        let from = self.project_root.join(name);
        if from.is_file() {
            let to = self.path.join(name);
            fs::copy(&from, &to).map_err(|e| ValidateError::env(&from, "Failed to copy", e))?;
        }
        Ok(())
    }

    fn copy_test_files(&self, output_dir: &Path, patterns: &[String]) -> Result<usize> {
        let patterns: Vec<Pattern> = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid test pattern");
                    None
                }
            })
            .collect();
        if patterns.is_empty() {
            return Ok(0);
        }

        let root = self.project_root.as_path();
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            let path = entry.path();
            let skipped = entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name));
            !skipped && path != output_dir
        });

        let mut copied = 0;
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if !patterns.iter().any(|p| p.matches_path(relative)) {
                continue;
            }
            let target = self.path.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ValidateError::env(parent, "Failed to create directory", e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| ValidateError::env(entry.path(), "Failed to copy", e))?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Point the sandbox manifest's entry fields at the copied build output.
    pub fn rewrite_manifest(&self, entries: &PackageEntries) -> Result<()> {
        let path = self.path.join("package.json");
        let mut manifest = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Value>(&raw)?,
            Err(_) => json!({ "name": "kiln-validate-sandbox", "version": "0.0.0", "private": true }),
        };
        let Some(object) = manifest.as_object_mut() else {
            return Err(ValidateError::InvalidInput("package.json is not an object".to_string()));
        };

        let root = entries.root();
        set_or_remove(object, "main", root.and_then(|t| t.require.clone()));
        set_or_remove(object, "module", root.and_then(|t| t.import.clone()));
        set_or_remove(object, "types", self.find_declarations());
        object.remove("typings");
        object.remove("browser");

        let mut exports = Map::new();
        for (subpath, targets) in &entries.exports {
            let mut conditions = Map::new();
            if let Some(import) = &targets.import {
                conditions.insert("import".into(), Value::String(import.clone()));
            }
            if let Some(require) = &targets.require {
                conditions.insert("require".into(), Value::String(require.clone()));
            }
            if !conditions.is_empty() {
                exports.insert(subpath.clone(), Value::Object(conditions));
            }
        }
        exports.insert("./package.json".into(), Value::String("./package.json".into()));
        object.insert("exports".into(), Value::Object(exports));

        fs::write(&path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| ValidateError::env(&path, "Failed to write manifest", e))?;
        Ok(())
    }

    fn find_declarations(&self) -> Option<String> {
        let dist = self.dist();
        let mut found: Vec<PathBuf> = WalkDir::new(&dist)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".d.ts"))
            .filter_map(|e| e.path().strip_prefix(&self.path).ok().map(Path::to_path_buf))
            .collect();
        found.sort_by_key(|p| (!p.ends_with("index.d.ts"), p.components().count()));
        found
            .first()
            .map(|p| format!("./{}", p.to_string_lossy().replace('\\', "/")))
    }

    /// Install the sandbox's dependencies. `None` when there is nothing to install.
    pub async fn install_dependencies(&self, limit: Duration) -> Result<Option<ProcessOutput>> {
        let Some(manifest) = read_manifest(&self.path) else {
            return Ok(None);
        };
        let has_deps = ["dependencies", "devDependencies", "peerDependencies"]
            .iter()
            .filter_map(|field| manifest.get(field).and_then(Value::as_object))
            .any(|deps| !deps.is_empty());
        if !has_deps {
            debug!("No dependencies to install");
            return Ok(None);
        }

        let manager = PackageManager::detect(&self.path);
        info!(manager = manager.program(), "Installing sandbox dependencies");
        let output = process::run(manager.program(), &manager.install_args(), &self.path, limit).await?;
        if !output.success {
            return Err(ValidateError::Command {
                command: format!("{} install", manager.program()),
                message: output.stderr.lines().last().unwrap_or("install failed").to_string(),
            });
        }
        Ok(Some(output))
    }

    /// Make the project's installed packages resolvable from the sandbox.
    /// Returns whether a link was created.
    pub fn link_dependencies(&self) -> Result<bool> {
        let source = self.project_root.join("node_modules");
        let target = self.path.join("node_modules");
        if !source.is_dir() || target.exists() {
            return Ok(false);
        }
        #[cfg(unix)]
        let linked = std::os::unix::fs::symlink(&source, &target);
        #[cfg(windows)]
        let linked = std::os::windows::fs::symlink_dir(&source, &target);
        linked.map_err(|e| ValidateError::env(&target, "Failed to link node_modules", e))?;
        debug!(from = %source.display(), "Linked project dependencies");
        Ok(true)
    }

    /// Remove the sandbox. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        if self.keep {
            let kept = dir.keep();
            info!(sandbox = %kept.display(), "Keeping validation sandbox");
            return Ok(());
        }
        dir.close()
            .map_err(|e| ValidateError::env(&self.path, "Failed to remove sandbox", e))
    }
}

impl Drop for TemporaryEnvironment {
    fn drop(&mut self) {
        if self.keep {
            if let Some(dir) = self.dir.take() {
                let _ = dir.keep();
            }
        }
    }
}

fn set_or_remove(object: &mut Map<String, Value>, key: &str, value: Option<String>) {
    match value {
        Some(value) => {
            object.insert(key.to_string(), Value::String(value));
        }
        None => {
            object.remove(key);
        }
    }
}

fn copy_tree(from: &Path, to: &Path, keep: impl Fn(&Path) -> bool) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ValidateError::env(&target, "Failed to create directory", e))?;
        } else if entry.file_type().is_file() && keep(entry.path()) {
            fs::copy(entry.path(), &target).map_err(|e| ValidateError::env(entry.path(), "Failed to copy", e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Pin the module system of each format directory so `.js` files load the
/// same way regardless of the project's `"type"` field.
fn mark_module_kinds(dist: &Path) -> Result<()> {
    for (format, kind) in [
        (OutputFormat::Esm, "module"),
        (OutputFormat::Cjs, "commonjs"),
        (OutputFormat::Umd, "commonjs"),
        (OutputFormat::Iife, "commonjs"),
    ] {
        let dir = dist.join(format.dir_name());
        let manifest = dir.join("package.json");
        if dir.is_dir() && !manifest.exists() {
            fs::write(&manifest, format!("{{\"type\":\"{kind}\"}}\n"))
                .map_err(|e| ValidateError::env(&manifest, "Failed to write manifest", e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::{BuildMode, BundlerKind, LibraryType};

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("dist/es")).unwrap();
        fs::create_dir_all(root.join("dist/cjs")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("dist/es/index.mjs"), "export const a = 1;").unwrap();
        fs::write(root.join("dist/cjs/index.js"), "exports.a = 1;").unwrap();
        fs::write(root.join("src/index.ts"), "export const a = 1;").unwrap();
        fs::write(root.join("src/index.test.ts"), "test('a', () => {});").unwrap();
        fs::write(root.join("node_modules/dep/x.test.js"), "").unwrap();
        fs::write(root.join("yarn.lock"), "").unwrap();
        fs::write(root.join("vitest.config.ts"), "export default {};").unwrap();
        fs::write(
            root.join("package.json"),
            r#"{"name":"acme","type":"module","main":"src/index.ts","types":"src/index.d.ts"}"#,
        )
        .unwrap();
        dir
    }

    fn result() -> BuildResult {
        let mut result = BuildResult::new(BundlerKind::Rolldown, BuildMode::Production, LibraryType::Typescript);
        for (file, format) in [("es/index.mjs", OutputFormat::Esm), ("cjs/index.js", OutputFormat::Cjs)] {
            let mut chunk = OutputArtifact::chunk(file, format, "");
            chunk.is_entry = true;
            result.outputs.push(chunk);
        }
        result
    }

    #[test]
    fn sandbox_mirrors_a_consumer_install() {
        let project = project();
        let options = EnvironmentOptions {
            test_patterns: vec!["**/*.test.*".to_string()],
            include_src: false,
            keep: false,
        };
        let env = TemporaryEnvironment::create(project.path(), &project.path().join("dist"), options).unwrap();
        let root = env.path();

        assert!(root.file_name().unwrap().to_string_lossy().starts_with("kiln-validate-"));
        assert!(root.join("dist/es/index.mjs").is_file());
        assert!(root.join("dist/cjs/package.json").is_file());
        assert!(root.join("yarn.lock").is_file());
        assert!(root.join("vitest.config.ts").is_file());
        assert!(root.join("src/index.test.ts").is_file());
        assert!(!root.join("src/index.ts").exists());
        assert!(!root.join("node_modules").exists());

        env.rewrite_manifest(&PackageEntries::from_result(&result())).unwrap();
        let manifest: Value = serde_json::from_str(&fs::read_to_string(root.join("package.json")).unwrap()).unwrap();
        assert_eq!(manifest["main"], "./dist/cjs/index.js");
        assert_eq!(manifest["module"], "./dist/es/index.mjs");
        assert!(manifest.get("types").is_none());
        assert_eq!(manifest["exports"]["."]["import"], "./dist/es/index.mjs");
        assert_eq!(manifest["exports"]["./package.json"], "./package.json");
    }

    #[test]
    fn cleanup_is_idempotent_and_honors_keep() {
        let project = project();
        let dist = project.path().join("dist");

        let mut env = TemporaryEnvironment::create(project.path(), &dist, EnvironmentOptions::default()).unwrap();
        let path = env.path().to_path_buf();
        env.cleanup().unwrap();
        env.cleanup().unwrap();
        assert!(!path.exists());

        let options = EnvironmentOptions {
            keep: true,
            ..EnvironmentOptions::default()
        };
        let kept = TemporaryEnvironment::create(project.path(), &dist, options).unwrap();
        let path = kept.path().to_path_buf();
        drop(kept);
        assert!(path.exists());
        fs::remove_dir_all(path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn links_project_dependencies() {
        let project = project();
        let mut env =
            TemporaryEnvironment::create(project.path(), &project.path().join("dist"), EnvironmentOptions::default())
                .unwrap();
        assert!(env.link_dependencies().unwrap());
        assert!(env.path().join("node_modules/dep/x.test.js").is_file());
        assert!(!env.link_dependencies().unwrap());

        env.cleanup().unwrap();
        assert!(project.path().join("node_modules/dep/x.test.js").is_file());
    }

    #[test]
    fn named_entries_become_subpath_exports() {
        let mut result = result();
        let mut utils = OutputArtifact::chunk("es/utils.mjs", OutputFormat::Esm, "");
        utils.is_entry = true;
        result.outputs.push(utils);

        let entries = PackageEntries::from_result(&result);
        assert_eq!(entries.exports.len(), 2);
        assert_eq!(
            entries.exports["./utils"].import.as_deref(),
            Some("./dist/es/utils.mjs")
        );
        assert!(entries.exports["./utils"].require.is_none());
    }
}
