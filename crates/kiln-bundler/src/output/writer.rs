//! Writing artifacts to disk.
//!
//! Every target path is normalized and must stay inside the output
//! directory. Files are written to `*.tmp` siblings first and renamed into
//! place once all writes succeeded; on failure the temporaries are removed.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use tracing::{debug, warn};

use super::OutputArtifact;
use crate::{Error, Result};

/// Write all artifacts under `dir`, returning the written paths.
pub fn write_artifacts(artifacts: &[OutputArtifact], dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = normalize_dir(dir)?;
    fs::create_dir_all(&dir)
        .map_err(|e| Error::fs(&dir, "Failed to create output directory", e))?;

    let mut operations = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let target = validate_output_path(&dir, &artifact.file_name)?;
        operations.push((target, artifact.bytes()));
    }

    write_files_atomic(&operations)?;
    debug!(dir = %dir.display(), files = operations.len(), "Wrote build output");
    Ok(operations.into_iter().map(|(path, _)| path).collect())
}

/// Remove the output directory before a build.
///
/// Refuses to delete the project root or any of its ancestors.
pub fn clean_output_dir(dir: &Path, project_root: &Path) -> Result<()> {
    let dir = normalize_dir(dir)?;
    let root = normalize_dir(project_root)?;
    if root.starts_with(&dir) {
        return Err(Error::InvalidOutputPath(format!(
            "Refusing to clean '{}': it contains the project root",
            dir.display()
        )));
    }
    if dir.exists() {
        fs::remove_dir_all(&dir)
            .map_err(|e| Error::fs(&dir, "Failed to clean output directory", e))?;
        debug!(dir = %dir.display(), "Cleaned output directory");
    }
    Ok(())
}

fn normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }
    let cwd = std::env::current_dir().map_err(|e| {
        Error::InvalidOutputPath(format!("Failed to get current directory: {e}"))
    })?;
    Ok(cwd.join(cleaned).clean())
}

/// Resolve `file_name` under `base_dir`, rejecting anything that escapes it.
pub fn validate_output_path(base_dir: &Path, file_name: &str) -> Result<PathBuf> {
    if file_name.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }
    if file_name.trim().is_empty() {
        return Err(Error::InvalidOutputPath("Filename is empty".to_string()));
    }

    let full_path = base_dir.join(Path::new(file_name).clean()).clean();
    if !full_path.starts_with(base_dir) || full_path == base_dir {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}'",
            file_name,
            base_dir.display()
        )));
    }
    Ok(full_path)
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

fn write_files_atomic(operations: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(operations.len());

    for (target, content) in operations {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                cleanup_temp_files(&staged);
                return Err(Error::fs(parent, "Failed to create directory", e));
            }
        }

        let temp = temp_path(target);
        if let Err(e) = fs::write(&temp, content) {
            cleanup_temp_files(&staged);
            return Err(Error::fs(&temp, "Failed to write temporary file", e));
        }
        staged.push((temp, target.as_path()));
    }

    for (temp, target) in &staged {
        if let Err(e) = fs::rename(temp, target) {
            cleanup_temp_files(&staged);
            return Err(Error::fs(*target, "Failed to move file into place", e));
        }
    }
    Ok(())
}

fn cleanup_temp_files(staged: &[(PathBuf, &Path)]) {
    for (temp, _) in staged {
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                warn!("Failed to clean up temporary file '{}': {e}", temp.display());
            }
        }
    }
}
