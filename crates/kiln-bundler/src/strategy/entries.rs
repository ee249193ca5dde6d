//! Entry point resolution shared by every strategy.
//!
//! The result never contains a glob: missing entries are discovered under
//! `src/`, glob entries are expanded, and literal entries pass through.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_config::EntryConfig;
use kiln_config::validation::is_glob;
use tracing::debug;
use walkdir::WalkDir;

use crate::detect::scan::to_slash;
use crate::unified::UnifiedInput;
use crate::{Error, Result};

const SOURCE_DIR: &str = "src";
const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte"];

/// Resolve the user's entry declaration into concrete paths (relative to `root`).
pub fn resolve_entries(root: &Path, input: Option<&EntryConfig>) -> Result<UnifiedInput> {
    let resolved = match input {
        None => discover_source_entries(root)?,
        Some(EntryConfig::Single(entry)) if is_glob(entry) => {
            UnifiedInput::Named(expand_globs(root, std::slice::from_ref(entry))?)
        }
        Some(EntryConfig::Single(entry)) => UnifiedInput::Single(PathBuf::from(entry)),
        Some(EntryConfig::Multiple(entries)) if entries.iter().any(|e| is_glob(e)) => {
            UnifiedInput::Named(expand_globs(root, entries)?)
        }
        Some(EntryConfig::Multiple(entries)) => {
            UnifiedInput::Multiple(entries.iter().map(PathBuf::from).collect())
        }
        Some(EntryConfig::Named(map)) => {
            if let Some((name, pattern)) = map.iter().find(|(_, path)| is_glob(path)) {
                return Err(Error::Config {
                    message: format!("Named entry '{name}' is a glob pattern: {pattern}"),
                    suggestion: Some(
                        "Use a list of globs, or give each named entry a concrete path".to_string(),
                    ),
                });
            }
            UnifiedInput::Named(
                map.iter()
                    .map(|(name, path)| (name.clone(), PathBuf::from(path)))
                    .collect(),
            )
        }
    };

    debug!(entries = resolved.len(), "Resolved entries");
    Ok(resolved)
}

/// Whether a file can be a build entry.
pub fn is_entry_candidate(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_source_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));

    has_source_ext
        && !file_name.ends_with(".d.ts")
        && !file_name.contains(".test.")
        && !file_name.contains(".spec.")
        && !path.components().any(|c| c.as_os_str() == "__tests__")
}

fn discover_source_entries(root: &Path) -> Result<UnifiedInput> {
    let source_root = root.join(SOURCE_DIR);
    let mut entries = BTreeMap::new();

    if source_root.is_dir() {
        for entry in WalkDir::new(&source_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name() != "node_modules")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(&source_root) else {
                continue;
            };
            if !is_entry_candidate(relative) {
                continue;
            }
            let Ok(from_root) = entry.path().strip_prefix(root) else {
                continue;
            };
            entries.insert(entry_key(relative), from_root.to_path_buf());
        }
    }

    if entries.is_empty() {
        return Err(Error::NoEntryMatches {
            patterns: vec![format!("{SOURCE_DIR}/**/*")],
        });
    }
    Ok(UnifiedInput::Named(entries))
}

fn expand_globs(root: &Path, patterns: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    let mut entries = BTreeMap::new();

    for pattern in patterns {
        if !is_glob(pattern) {
            let path = PathBuf::from(pattern);
            entries.insert(entry_key(strip_source_dir(&path)), path);
            continue;
        }

        let base = glob_base(pattern);
        let absolute = root.join(pattern);
        let walker = glob::glob(&absolute.to_string_lossy()).map_err(|e| Error::Config {
            message: format!("Invalid entry pattern '{pattern}': {e}"),
            suggestion: None,
        })?;

        for path in walker.filter_map(|p| p.ok()).filter(|p| p.is_file()) {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if !is_entry_candidate(relative) {
                continue;
            }
            let key_source = relative.strip_prefix(&base).unwrap_or(relative);
            entries.insert(entry_key(key_source), relative.to_path_buf());
        }
    }

    if entries.is_empty() {
        return Err(Error::NoEntryMatches {
            patterns: patterns.to_vec(),
        });
    }
    Ok(entries)
}

/// Literal directory prefix of a glob pattern (`src/components/*.ts` → `src/components`).
fn glob_base(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| !is_glob(&c.as_os_str().to_string_lossy()))
        .collect()
}

fn strip_source_dir(path: &Path) -> &Path {
    path.strip_prefix(SOURCE_DIR).unwrap_or(path)
}

/// Slash-separated path without its extension.
fn entry_key(relative: &Path) -> String {
    to_slash(&relative.with_extension(""))
}
