//! Validation runs against hand-built results and real builds.

mod helpers;

use std::fs;
use std::sync::Arc;

use helpers::{built_library, config, only_exports, only_snapshot, write};
use kiln_bundler::{
    BuilderConfig, BuilderOptions, LibraryBuilder, OutputFormat, PostBuildValidator, StageStatus,
};
use kiln_config::StageToggles;
use kiln_validate::{ValidateError, ValidationStage, Validator};

const MATCHING: &str = "export const add = (a: number, b: number) => a + b;\nexport function sub(a: number, b: number) { return a - b; }\n";
const WIDER: &str = "export const add = (a: number, b: number) => a + b;\nexport function sub(a: number, b: number) { return a - b; }\nexport function mul(a: number, b: number) { return a * b; }\n";

#[tokio::test]
async fn matching_exports_pass() {
    let (project, result) = built_library(MATCHING);
    let validator = Validator::default();

    let outcome = validator
        .run(&result, &config(project.path(), only_exports()))
        .await
        .expect("validation");

    assert!(outcome.success, "{:?}", outcome.warnings);
    assert!(outcome.errors.is_empty());
    let exports = &outcome.report.exports;
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].entry, "index");
    assert!(exports[0].missing.is_empty());
}

#[tokio::test]
async fn lenient_mode_reports_missing_exports_as_warnings() {
    let (project, result) = built_library(WIDER);
    let validator = Validator::default();

    let outcome = validator
        .run(&result, &config(project.path(), only_exports()))
        .await
        .expect("lenient validation still returns a result");

    assert!(!outcome.success);
    assert!(
        outcome.warnings.iter().any(|w| w.starts_with("export-comparison:") && w.contains("mul")),
        "{:?}",
        outcome.warnings
    );
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.stats.stages_failed, 1);

    let stage = outcome
        .report
        .stages
        .iter()
        .find(|s| s.stage == ValidationStage::ExportComparison)
        .expect("export stage recorded");
    assert_eq!(stage.status, StageStatus::Failed);
}

#[tokio::test]
async fn strict_mode_fails_on_the_first_discrepancy() {
    let (project, result) = built_library(WIDER);
    let mut config = config(project.path(), only_exports());
    config.validation.strict = true;

    let err = Validator::default().run(&result, &config).await.unwrap_err();
    match err {
        ValidateError::Discrepancy { stage, details } => {
            assert_eq!(stage, ValidationStage::ExportComparison);
            assert!(details.iter().any(|d| d.contains("mul")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn disabled_stages_are_skipped() {
    let (project, result) = built_library(MATCHING);

    let outcome = Validator::default()
        .run(&result, &config(project.path(), StageToggles::none()))
        .await
        .expect("validation");

    assert!(outcome.success);
    assert_eq!(outcome.stats.stages_passed, 0);
    assert_eq!(outcome.stats.stages_skipped, 8);
    assert!(outcome.report.stages.iter().all(|s| s.status == StageStatus::Skipped));
}

#[tokio::test]
async fn repeated_runs_are_served_from_cache() {
    let (project, result) = built_library(MATCHING);
    let validator = Validator::default();
    let config = config(project.path(), only_exports());

    let first = validator.run(&result, &config).await.expect("first run");
    let second = validator.run(&result, &config).await.expect("second run");

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.validation_id, second.validation_id);
    assert_eq!(validator.cache_stats().hits, 1);
}

#[tokio::test]
async fn changing_the_output_dir_invalidates_the_cache() {
    let (project, result) = built_library(MATCHING);
    let validator = Validator::default();
    let first = validator
        .run(&result, &config(project.path(), only_exports()))
        .await
        .expect("first run");

    let root = project.path();
    write(root, "out/es/index.mjs", &fs::read_to_string(root.join("dist/es/index.mjs")).expect("read esm"));
    write(root, "out/cjs/index.js", &fs::read_to_string(root.join("dist/cjs/index.js")).expect("read cjs"));
    let mut moved = config(root, only_exports());
    moved.output.dir = "out".into();

    let second = validator.run(&result, &moved).await.expect("second run");
    assert!(!second.cached);
    assert_ne!(first.validation_id, second.validation_id);
}

#[tokio::test]
async fn disabling_the_cache_always_reruns() {
    let (project, result) = built_library(MATCHING);
    let validator = Validator::default();
    let mut config = config(project.path(), only_exports());
    config.validation.cache = false;

    validator.run(&result, &config).await.expect("first run");
    let second = validator.run(&result, &config).await.expect("second run");
    assert!(!second.cached);
}

#[tokio::test]
async fn missing_output_dir_is_an_error() {
    let (project, result) = built_library(MATCHING);
    fs::remove_dir_all(project.path().join("dist")).expect("remove dist");

    let err = Validator::default()
        .run(&result, &config(project.path(), only_exports()))
        .await
        .unwrap_err();
    assert!(matches!(err, ValidateError::InvalidInput(_)), "{err}");
}

#[tokio::test]
async fn snapshot_records_a_baseline_then_detects_drift() {
    let (project, mut result) = built_library(MATCHING);
    let validator = Validator::default();
    let mut config = config(project.path(), only_snapshot());
    config.validation.cache = false;

    let first = validator.run(&result, &config).await.expect("first run");
    let diff = first.report.snapshot.as_ref().expect("snapshot diff");
    assert!(diff.first_run);
    assert!(first.success);
    assert!(project.path().join(".kiln/snapshots.json").is_file());

    let second = validator.run(&result, &config).await.expect("second run");
    let diff = second.report.snapshot.as_ref().expect("snapshot diff");
    assert!(!diff.first_run);
    assert!(diff.matches());
    assert!(second.success);

    result.outputs[0].size += 24;
    result.outputs[0].hash = "changed".to_string();
    let drifted = validator.run(&result, &config).await.expect("third run");
    let diff = drifted.report.snapshot.as_ref().expect("snapshot diff");
    assert!(!diff.matches());
    assert!(!drifted.success);

    config.validation.update_snapshots = true;
    let updated = validator.run(&result, &config).await.expect("update run");
    assert!(updated.success);
    assert!(updated.report.snapshot.as_ref().is_some_and(|d| d.updated));
}

#[tokio::test]
async fn post_build_validator_maps_the_result() {
    let (project, result) = built_library(WIDER);
    let validator = Validator::default();
    let config = config(project.path(), only_exports());

    let summary = validator.validate(&result, &config).await.expect("summary");
    assert!(!summary.success);
    assert!(!summary.cached);
    assert!(summary.warnings.iter().any(|w| w.contains("mul")));
    assert!(summary.report.is_some());

    validator.dispose().await;
    assert_eq!(validator.cache_stats().entries, 0);
}

#[tokio::test]
async fn builder_runs_the_validator_after_a_build() {
    let project = tempfile::TempDir::new().expect("temp dir");
    let root = project.path();
    write(root, "package.json", r#"{ "name": "acme-strings", "version": "0.1.0" }"#);
    write(root, "tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#);
    write(
        root,
        "src/index.ts",
        "export function shout(value: string): string {\n  return value.toUpperCase();\n}\nexport const VERSION: string = '0.1.0';\n",
    );

    let builder = LibraryBuilder::new(BuilderOptions::default().with_validator(Arc::new(Validator::default())));
    let mut config = BuilderConfig::new(root)
        .with_input("src/index.ts")
        .with_formats([OutputFormat::Esm, OutputFormat::Cjs]);
    config.validation.enabled = true;
    config.validation.install_dependencies = false;
    config.validation.stages = StageToggles {
        exports: true,
        snapshot: true,
        ..StageToggles::none()
    };
    config.validation.snapshot_path = Some(root.join(".kiln/snapshots.json"));

    let result = builder.build(config).await.expect("build");
    let validation = result.validation.expect("validation summary");
    assert!(validation.success, "{:?}", validation.warnings);
    assert!(validation.stages.iter().any(|s| s.name == "snapshot-tests"));
}
