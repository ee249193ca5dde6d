//! Validation stages and their per-run reports.

use std::fmt;

use kiln_bundler::{StageOutcome, StageStatus};
use kiln_config::StageToggles;
use serde::{Deserialize, Serialize};

/// Pipeline position. Stages only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStage {
    Idle,
    EnvironmentSetup,
    ExportComparison,
    ImportComparison,
    BehaviorComparison,
    RuntimeValidation,
    ApiCompatibility,
    PerformanceComparison,
    IntegrationTests,
    SnapshotTests,
    ReportGeneration,
    Cleanup,
    Done,
}

impl ValidationStage {
    /// Stages that can be switched off, in execution order.
    pub const CHECKS: [ValidationStage; 8] = [
        ValidationStage::ExportComparison,
        ValidationStage::ImportComparison,
        ValidationStage::BehaviorComparison,
        ValidationStage::RuntimeValidation,
        ValidationStage::ApiCompatibility,
        ValidationStage::PerformanceComparison,
        ValidationStage::IntegrationTests,
        ValidationStage::SnapshotTests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStage::Idle => "idle",
            ValidationStage::EnvironmentSetup => "environment-setup",
            ValidationStage::ExportComparison => "export-comparison",
            ValidationStage::ImportComparison => "import-comparison",
            ValidationStage::BehaviorComparison => "behavior-comparison",
            ValidationStage::RuntimeValidation => "runtime-validation",
            ValidationStage::ApiCompatibility => "api-compatibility",
            ValidationStage::PerformanceComparison => "performance-comparison",
            ValidationStage::IntegrationTests => "integration-tests",
            ValidationStage::SnapshotTests => "snapshot-tests",
            ValidationStage::ReportGeneration => "report-generation",
            ValidationStage::Cleanup => "cleanup",
            ValidationStage::Done => "done",
        }
    }

    /// Whether `toggles` lets this stage run. Bookkeeping stages always run.
    pub fn is_enabled(&self, toggles: &StageToggles) -> bool {
        match self {
            ValidationStage::ExportComparison => toggles.exports,
            ValidationStage::ImportComparison => toggles.imports,
            ValidationStage::BehaviorComparison => toggles.behavior,
            ValidationStage::RuntimeValidation => toggles.runtime,
            ValidationStage::ApiCompatibility => toggles.api,
            ValidationStage::PerformanceComparison => toggles.performance,
            ValidationStage::IntegrationTests => toggles.integration,
            ValidationStage::SnapshotTests => toggles.snapshot,
            _ => true,
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one stage concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: ValidationStage,
    pub status: StageStatus,
    /// The stage's success/identical/compatible flag. `None` for advisory stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discrepancies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl StageReport {
    pub fn skipped(stage: ValidationStage, reason: Option<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            flag: None,
            discrepancies: Vec::new(),
            detail: reason,
            duration_ms: 0,
        }
    }

    /// A finished check: passed when there is nothing to report.
    pub fn checked(stage: ValidationStage, discrepancies: Vec<String>) -> Self {
        let ok = discrepancies.is_empty();
        Self {
            stage,
            status: if ok { StageStatus::Passed } else { StageStatus::Failed },
            flag: Some(ok),
            discrepancies,
            detail: None,
            duration_ms: 0,
        }
    }

    /// A stage whose outcome never gates success.
    pub fn advisory(stage: ValidationStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Passed,
            flag: None,
            discrepancies: Vec::new(),
            detail: Some(detail.into()),
            duration_ms: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Skipped stages are vacuously successful.
    pub fn is_success(&self) -> bool {
        self.flag.unwrap_or(true)
    }
}

impl From<&StageReport> for StageOutcome {
    fn from(report: &StageReport) -> Self {
        let name = report.stage.as_str();
        match report.status {
            StageStatus::Passed => StageOutcome::passed(name),
            StageStatus::Skipped => StageOutcome::skipped(name),
            StageStatus::Failed => {
                StageOutcome::failed(name, report.discrepancies.join("; "))
            }
        }
    }
}
