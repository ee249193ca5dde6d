//! Disk-backed output snapshots.
//!
//! The store is one JSON document mapping `"<project root>-<library type>"`
//! to the `{size, hash}` of every emitted file. The first validation of a
//! project records a baseline; later ones diff against it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use kiln_bundler::{BuildResult, LibraryType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ValidateError};

pub const DEFAULT_SNAPSHOT_PATH: &str = ".kiln/validation-snapshots.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub size: u64,
    pub hash: String,
}

pub type Snapshot = BTreeMap<String, FileSnapshot>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    /// No baseline existed; this run recorded one.
    pub first_run: bool,
    /// The baseline was replaced on request.
    pub updated: bool,
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn matches(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    pub fn discrepancies(&self) -> Vec<String> {
        let changed = self.changed.iter().map(|f| format!("'{f}' changed since the snapshot"));
        let added = self.added.iter().map(|f| format!("'{f}' is new since the snapshot"));
        let removed = self.removed.iter().map(|f| format!("'{f}' disappeared since the snapshot"));
        changed.chain(added).chain(removed).collect()
    }
}

pub fn snapshot_key(project_root: &Path, library_type: LibraryType) -> String {
    format!("{}-{library_type}", project_root.display())
}

/// The emitted files of `result`, sourcemaps included.
pub fn snapshot_of(result: &BuildResult) -> Snapshot {
    result
        .outputs
        .iter()
        .map(|artifact| {
            (
                artifact.file_name.clone(),
                FileSnapshot {
                    size: artifact.size,
                    hash: artifact.hash.clone(),
                },
            )
        })
        .collect()
}

pub fn diff(baseline: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();
    for (file, now) in current {
        match baseline.get(file) {
            None => diff.added.push(file.clone()),
            Some(before) if before != now => diff.changed.push(file.clone()),
            Some(_) => {}
        }
    }
    diff.removed = baseline
        .keys()
        .filter(|file| !current.contains_key(*file))
        .cloned()
        .collect();
    diff
}

/// Snapshot file access; one writer at a time within the process.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The configured location, else `.kiln/validation-snapshots.json` under the working directory.
    pub fn at(configured: Option<&Path>) -> Self {
        match configured {
            Some(path) => Self::new(path),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Self::new(cwd.join(DEFAULT_SNAPSHOT_PATH))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, Snapshot>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ValidateError::Snapshot(format!("{} is not a snapshot file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ValidateError::env(&self.path, "Failed to read snapshots", e)),
        }
    }

    fn save(&self, snapshots: &BTreeMap<String, Snapshot>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ValidateError::env(parent, "Failed to create snapshot directory", e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(snapshots)?)
            .map_err(|e| ValidateError::env(&tmp, "Failed to write snapshots", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| ValidateError::env(&self.path, "Failed to replace snapshots", e))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    /// Diff `current` against the stored baseline for `key`, recording it as
    /// the baseline when none exists or when `update` is set.
    pub fn check(&self, key: &str, current: Snapshot, update: bool) -> Result<SnapshotDiff> {
        let _guard = self.lock.lock();
        let mut snapshots = self.load()?;
        match snapshots.get(key) {
            Some(baseline) if !update => {
                let diff = diff(baseline, &current);
                debug!(key, matches = diff.matches(), "Compared against snapshot");
                Ok(diff)
            }
            existing => {
                let first_run = existing.is_none();
                info!(key, first_run, path = %self.path.display(), "Recording snapshot baseline");
                snapshots.insert(key.to_string(), current);
                self.save(&snapshots)?;
                Ok(SnapshotDiff {
                    first_run,
                    updated: !first_run,
                    ..SnapshotDiff::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(files: &[(&str, u64, &str)]) -> Snapshot {
        files
            .iter()
            .map(|(name, size, hash)| {
                (
                    name.to_string(),
                    FileSnapshot {
                        size: *size,
                        hash: hash.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn first_run_records_then_diffs() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/snapshots.json"));
        let key = snapshot_key(Path::new("/work/acme"), LibraryType::Typescript);
        assert_eq!(key, "/work/acme-typescript");

        let baseline = snapshot(&[("es/index.mjs", 10, "aa"), ("cjs/index.js", 12, "bb")]);
        let first = store.check(&key, baseline.clone(), false).unwrap();
        assert!(first.first_run);
        assert!(first.matches());
        assert!(store.path().is_file());
        assert!(!store.path().with_extension("json.tmp").exists());

        let same = store.check(&key, baseline, false).unwrap();
        assert!(!same.first_run);
        assert!(same.matches());

        let drifted = snapshot(&[("es/index.mjs", 11, "ac"), ("es/extra.mjs", 1, "cc")]);
        let diff = store.check(&key, drifted.clone(), false).unwrap();
        assert_eq!(diff.changed, ["es/index.mjs"]);
        assert_eq!(diff.added, ["es/extra.mjs"]);
        assert_eq!(diff.removed, ["cjs/index.js"]);
        assert_eq!(diff.discrepancies().len(), 3);

        let updated = store.check(&key, drifted.clone(), true).unwrap();
        assert!(updated.updated && updated.matches());
        assert!(store.check(&key, drifted, false).unwrap().matches());
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshots.json");
        fs::write(&path, "{not json").unwrap();
        let err = SnapshotStore::new(&path).get("k").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_SNAPSHOT");
    }
}
