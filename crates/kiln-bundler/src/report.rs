//! Build report JSON and the bundle size budget.

use std::path::Path;

use chrono::{DateTime, Utc};
use kiln_config::{BuildMode, BundlerKind, LibraryType, OutputFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::output::ArtifactKind;
use crate::result::BuildResult;
use crate::{Error, Result};

/// Offending files listed when the size budget is exceeded.
const MAX_OFFENDERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub meta: ReportMeta,
    pub totals: ReportTotals,
    pub files: Vec<ReportFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub bundler: BundlerKind,
    pub mode: BuildMode,
    pub library_type: LibraryType,
    pub build_id: String,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    pub raw: u64,
    pub gzip: u64,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub file_name: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub format: OutputFormat,
    pub size: u64,
    pub gzip_size: u64,
}

impl From<&BuildResult> for BuildReport {
    fn from(result: &BuildResult) -> Self {
        BuildReport {
            meta: ReportMeta {
                bundler: result.bundler,
                mode: result.mode,
                library_type: result.library_type,
                build_id: result.build_id.clone(),
                timestamp: result.timestamp,
                duration: result.duration_ms,
            },
            totals: ReportTotals {
                raw: result.stats.total_size,
                gzip: result.stats.total_gzip_size,
                file_count: result.stats.file_count,
            },
            files: result
                .outputs
                .iter()
                .map(|artifact| ReportFile {
                    file_name: artifact.file_name.clone(),
                    kind: artifact.kind,
                    format: artifact.format,
                    size: artifact.size,
                    gzip_size: artifact.gzip_size,
                })
                .collect(),
        }
    }
}

/// Write the report for `result` as pretty JSON, creating parent directories.
pub fn write_build_report(result: &BuildResult, path: &Path) -> Result<BuildReport> {
    let report = BuildReport::from(result);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::fs(parent, "Failed to create report directory", e))?;
    }
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).map_err(|e| Error::fs(path, "Failed to write build report", e))?;
    info!(path = %path.display(), files = report.files.len(), "Wrote build report");
    Ok(report)
}

/// Fail when the gzip size of the emitted code (source maps excluded) exceeds `limit`.
pub fn enforce_size_limit(result: &BuildResult, limit: u64) -> Result<()> {
    let mut counted: Vec<(&str, u64)> = result
        .outputs
        .iter()
        .filter(|a| !a.is_sourcemap())
        .map(|a| (a.file_name.as_str(), a.gzip_size))
        .collect();
    let actual: u64 = counted.iter().map(|(_, size)| size).sum();
    if actual <= limit {
        return Ok(());
    }

    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    Err(Error::SizeLimitExceeded {
        limit,
        actual,
        offenders: counted
            .into_iter()
            .take(MAX_OFFENDERS)
            .map(|(name, size)| (name.to_string(), size))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BuildStats, OutputArtifact};
    use tempfile::TempDir;

    fn result() -> BuildResult {
        let mut result = BuildResult::new(BundlerKind::Rolldown, BuildMode::Production, LibraryType::React);
        let mut entry = OutputArtifact::chunk("es/index.js", OutputFormat::Esm, "export {}");
        entry.gzip_size = 300;
        let mut chunk = OutputArtifact::chunk("es/util-abc.js", OutputFormat::Esm, "export {}");
        chunk.gzip_size = 120;
        let mut map = OutputArtifact::asset("es/index.js.map", OutputFormat::Esm, b"{}".to_vec());
        map.gzip_size = 900;
        result.outputs = vec![entry, chunk, map];
        result.stats = BuildStats::from_artifacts(&result.outputs);
        result
    }

    #[test]
    fn report_uses_wire_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/build.json");
        write_build_report(&result(), &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["meta"]["bundler"], "rolldown");
        assert_eq!(json["meta"]["libraryType"], "react");
        assert!(json["meta"]["buildId"].is_string());
        assert_eq!(json["totals"]["fileCount"], 3);
        assert_eq!(json["files"][0]["fileName"], "es/index.js");
        assert_eq!(json["files"][0]["type"], "chunk");
        assert_eq!(json["files"][2]["gzipSize"], 900);
    }

    #[test]
    fn size_limit_ignores_source_maps() {
        let result = result();
        enforce_size_limit(&result, 420).unwrap();

        let err = enforce_size_limit(&result, 400).unwrap_err();
        match err {
            Error::SizeLimitExceeded { actual, offenders, .. } => {
                assert_eq!(actual, 420);
                assert_eq!(offenders[0], ("es/index.js".to_string(), 300));
                assert_eq!(offenders.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
