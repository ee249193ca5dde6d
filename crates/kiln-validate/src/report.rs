//! The validation report: everything the stages found, as JSON or text.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use kiln_bundler::{LibraryType, StageStatus};
use serde::{Deserialize, Serialize};

use crate::compare::{ApiComparison, BehaviorCase, ExportComparison, ImportComparison, PerformanceComparison};
use crate::runner::TestRunResult;
use crate::snapshot::SnapshotDiff;
use crate::stage::StageReport;

/// One artifact or self-reference load attempted by the integration stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationCheck {
    pub target: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub stages_passed: usize,
    pub stages_failed: usize,
    pub stages_skipped: usize,
    pub duration_ms: u64,
}

impl ValidationStats {
    pub fn from_stages(stages: &[StageReport], duration_ms: u64) -> Self {
        let count = |status: StageStatus| stages.iter().filter(|s| s.status == status).count();
        Self {
            stages_passed: count(StageStatus::Passed),
            stages_failed: count(StageStatus::Failed),
            stages_skipped: count(StageStatus::Skipped),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub validation_id: String,
    pub build_id: String,
    pub project_root: String,
    pub library_type: LibraryType,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub strict: bool,
    pub stats: ValidationStats,
    pub stages: Vec<StageReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<ExportComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<ImportComparison>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behavior: Vec<BehaviorCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestRunResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api: Vec<ApiComparison>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performance: Vec<PerformanceComparison>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integration: Vec<IntegrationCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotDiff>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Human-readable summary, one line per stage.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let verdict = if self.success { "PASSED" } else { "FAILED" };
        let _ = writeln!(
            out,
            "Validation {} {verdict} in {}ms ({} passed, {} failed, {} skipped)",
            self.validation_id,
            self.stats.duration_ms,
            self.stats.stages_passed,
            self.stats.stages_failed,
            self.stats.stages_skipped
        );

        for stage in &self.stages {
            let mark = match stage.status {
                StageStatus::Passed => "PASS",
                StageStatus::Failed => "FAIL",
                StageStatus::Skipped => "SKIP",
            };
            let _ = write!(out, "  [{mark}] {}", stage.stage);
            if let Some(detail) = &stage.detail {
                let _ = write!(out, ": {detail}");
            }
            out.push('\n');
            for discrepancy in &stage.discrepancies {
                let _ = writeln!(out, "         - {discrepancy}");
            }
        }

        if let Some(tests) = &self.tests {
            let _ = writeln!(
                out,
                "Tests: {} passed, {} failed, {} skipped ({} total)",
                tests.passed, tests.failed, tests.skipped, tests.total
            );
            if let Some(coverage) = tests.coverage {
                let _ = writeln!(
                    out,
                    "Coverage: {:.1}% lines, {:.1}% branches, {:.1}% functions",
                    coverage.lines, coverage.branches, coverage.functions
                );
            }
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {warning}");
        }
        for error in &self.errors {
            let _ = writeln!(out, "error: {error}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ValidationStage;

    #[test]
    fn summary_lists_stages_and_discrepancies() {
        let stages = vec![
            StageReport::checked(ValidationStage::ExportComparison, Vec::new()),
            StageReport::checked(ValidationStage::ImportComparison, vec!["bundle imports undeclared package 'x'".into()]),
            StageReport::skipped(ValidationStage::RuntimeValidation, Some("no test command".into())),
        ];
        let report = ValidationReport {
            validation_id: "v1".into(),
            build_id: "b1".into(),
            project_root: "/work/acme".into(),
            library_type: LibraryType::Typescript,
            timestamp: Utc::now(),
            success: false,
            strict: false,
            stats: ValidationStats::from_stages(&stages, 42),
            stages,
            exports: Vec::new(),
            imports: None,
            behavior: Vec::new(),
            tests: None,
            api: Vec::new(),
            performance: Vec::new(),
            integration: Vec::new(),
            snapshot: None,
            errors: Vec::new(),
            warnings: vec!["import-comparison: bundle imports undeclared package 'x'".into()],
        };

        let text = report.summary();
        assert!(text.starts_with("Validation v1 FAILED in 42ms (1 passed, 1 failed, 1 skipped)"));
        assert!(text.contains("[SKIP] runtime-validation: no test command"));
        assert!(text.contains("         - bundle imports undeclared package 'x'"));

        let json = report.to_json().unwrap();
        assert_eq!(json["stats"]["stagesFailed"], 1);
        assert_eq!(json["stages"][1]["stage"], "import-comparison");
        assert!(json.get("exports").is_none());
    }
}
