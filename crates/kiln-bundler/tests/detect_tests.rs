//! Library type detection against on-disk fixtures.

mod helpers;

use helpers::{react_library, ts_library, vue_library, write};
use kiln_bundler::{DetectorOptions, EvidenceKind, LibraryType, LibraryTypeDetector};
use tempfile::TempDir;

#[tokio::test]
async fn typescript_library_is_detected_with_confidence() {
    let project = ts_library();
    let result = LibraryTypeDetector::default().detect(project.path()).await;

    assert_eq!(result.library_type, LibraryType::Typescript);
    assert!(result.confidence >= 0.6, "confidence {}", result.confidence);
    assert!(result.confidence <= 1.0);
    assert!(result.evidence.iter().any(|e| e.kind == EvidenceKind::Config));
}

#[tokio::test]
async fn react_beats_solid_and_preact_on_shared_file_evidence() {
    let project = react_library();
    let result = LibraryTypeDetector::default().detect(project.path()).await;

    assert_eq!(result.library_type, LibraryType::React);
    assert!(result.candidates.len() >= 2);
    assert_eq!(result.candidates[0].library_type, LibraryType::React);
}

#[tokio::test]
async fn vue_fast_path_picks_major_from_range() {
    let detector = LibraryTypeDetector::default();

    let vue2 = vue_library("^2.7.14");
    let result = detector.detect(vue2.path()).await;
    assert_eq!(result.library_type, LibraryType::Vue2);
    assert_eq!(result.confidence, 1.0);

    let vue3 = vue_library("^3.4.0");
    assert_eq!(detector.detect(vue3.path()).await.library_type, LibraryType::Vue3);

    let unknown = vue_library("latest");
    assert_eq!(detector.detect(unknown.path()).await.library_type, LibraryType::Vue3);
}

#[tokio::test]
async fn weak_evidence_falls_back_to_mixed_but_keeps_evidence() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "package.json", r#"{ "name": "loose" }"#);
    write(dir.path(), "src/index.ts", "export {};\n");

    let result = LibraryTypeDetector::default().detect(dir.path()).await;
    assert_eq!(result.library_type, LibraryType::Mixed);
    assert!(result.confidence < 0.6);
    assert!(!result.evidence.is_empty());
}

#[tokio::test]
async fn lower_floor_accepts_weak_winner() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "package.json", r#"{ "name": "loose" }"#);
    write(dir.path(), "src/index.ts", "export {};\n");

    let detector = LibraryTypeDetector::new(DetectorOptions {
        min_confidence: 0.0,
        ..DetectorOptions::default()
    });
    assert_eq!(detector.detect(dir.path()).await.library_type, LibraryType::Typescript);
}

#[tokio::test]
async fn broken_manifest_never_fails_detection() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "package.json", "{ not json");

    let result = LibraryTypeDetector::default().detect(dir.path()).await;
    assert_eq!(result.library_type, LibraryType::Typescript);
    assert!((result.confidence - 0.1).abs() < f64::EPSILON);
    assert_eq!(result.evidence.len(), 1);
    assert_eq!(result.evidence[0].kind, EvidenceKind::Error);
}

#[tokio::test]
async fn detection_is_deterministic() {
    let project = ts_library();
    let detector = LibraryTypeDetector::new(DetectorOptions {
        cache: false,
        ..DetectorOptions::default()
    });

    let first = detector.detect(project.path()).await;
    let second = detector.detect(project.path()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn cached_detection_is_reused() {
    let project = ts_library();
    let detector = LibraryTypeDetector::new(DetectorOptions {
        cache: true,
        ..DetectorOptions::default()
    });

    let first = detector.detect(project.path()).await;
    assert_eq!(detector.cache_len(), 1);
    assert_eq!(detector.detect(project.path()).await, first);

    detector.clear_cache();
    assert_eq!(detector.cache_len(), 0);
}
