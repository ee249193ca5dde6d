//! The outcome of one library build.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use kiln_config::{BuildMode, BundlerKind, LibraryType, OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::{BuildStats, OutputArtifact};

/// Wall-clock timings of a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPerformance {
    pub total_ms: u64,
    pub per_format: BTreeMap<OutputFormat, u64>,
    /// Whether the format builds ran concurrently.
    pub parallel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub name: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageOutcome {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Passed,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            detail: None,
        }
    }
}

/// What post-build validation reports back to the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub validation_id: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stages: Vec<StageOutcome>,
    /// Served from the validation cache.
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
}

impl ValidationSummary {
    pub fn failed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.status == StageStatus::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub success: bool,
    pub outputs: Vec<OutputArtifact>,
    pub duration_ms: u64,
    pub stats: BuildStats,
    pub performance: BuildPerformance,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub build_id: String,
    pub timestamp: DateTime<Utc>,
    pub bundler: BundlerKind,
    pub mode: BuildMode,
    pub library_type: LibraryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
}

impl BuildResult {
    /// A successful result stamped with a fresh build id.
    pub fn new(bundler: BundlerKind, mode: BuildMode, library_type: LibraryType) -> Self {
        Self {
            success: true,
            outputs: Vec::new(),
            duration_ms: 0,
            stats: BuildStats::default(),
            performance: BuildPerformance::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            build_id: new_build_id(),
            timestamp: Utc::now(),
            bundler,
            mode,
            library_type,
            validation: None,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &OutputArtifact> {
        self.outputs.iter().filter(|a| a.is_entry)
    }

    pub fn outputs_for(&self, format: OutputFormat) -> impl Iterator<Item = &OutputArtifact> {
        self.outputs.iter().filter(move |a| a.format == format)
    }

    /// Free artifact contents once they are on disk.
    pub fn drop_contents(&mut self) {
        for artifact in &mut self.outputs {
            artifact.code = None;
            artifact.source = None;
        }
    }
}

/// `<unix millis>-<first 8 hex chars of a v4 uuid>`.
pub fn new_build_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis}-{}", &uuid[..8])
}
