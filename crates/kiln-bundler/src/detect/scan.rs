//! One pass over a project tree collecting everything detection scores.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::{Error, Result};

const MAX_SCANNED_FILES: usize = 20_000;
const MAX_DEPTH: usize = 16;
const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build", "coverage", "target"];
const VUE_SOURCE_ROOTS: &[&str] = &["src", "lib", "components", "packages"];

#[derive(Debug, Default)]
pub(crate) struct ProjectScan {
    /// Root-relative paths with `/` separators.
    pub files: Vec<String>,
    /// Union of all dependency tables, name to declared range.
    pub dependencies: BTreeMap<String, String>,
    pub package_fields: BTreeSet<String>,
    pub root: PathBuf,
}

impl ProjectScan {
    pub fn collect(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Filesystem {
                path: root.to_path_buf(),
                message: "Project root is not a directory".to_string(),
                source: None,
            });
        }

        let mut scan = ProjectScan {
            root: root.to_path_buf(),
            ..Default::default()
        };
        scan.read_manifest()?;
        scan.walk()?;
        Ok(scan)
    }

    fn read_manifest(&mut self) -> Result<()> {
        let manifest = self.root.join("package.json");
        if !manifest.is_file() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&manifest)
            .map_err(|e| Error::fs(&manifest, "Failed to read package.json", e))?;
        let value: Value = serde_json::from_str(&raw)?;

        if let Some(object) = value.as_object() {
            self.package_fields = object.keys().cloned().collect();
            for table in [
                "dependencies",
                "devDependencies",
                "peerDependencies",
                "optionalDependencies",
            ] {
                if let Some(deps) = object.get(table).and_then(Value::as_object) {
                    for (name, range) in deps {
                        self.dependencies
                            .entry(name.clone())
                            .or_insert_with(|| range.as_str().unwrap_or_default().to_string());
                    }
                }
            }
        }
        Ok(())
    }

    fn walk(&mut self) -> Result<()> {
        let walker = WalkDir::new(&self.root)
            .max_depth(MAX_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    return Err(Error::Filesystem {
                        path,
                        message: "Failed to read project root".to_string(),
                        source: err.into_io_error(),
                    });
                }
                Err(err) => {
                    debug!("Skipping unreadable entry during detection: {err}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                self.files.push(to_slash(relative));
            }
            if self.files.len() >= MAX_SCANNED_FILES {
                debug!("Detection scan capped at {MAX_SCANNED_FILES} files");
                break;
            }
        }
        Ok(())
    }

    pub fn has_root_file(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    /// `.vue` files under conventional source roots or at the top level.
    pub fn vue_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.ends_with(".vue"))
            .filter(|f| match f.split_once('/') {
                None => true,
                Some((first, _)) => VUE_SOURCE_ROOTS.contains(&first),
            })
            .map(String::as_str)
            .collect()
    }
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
