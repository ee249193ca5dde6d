//! Library type detection.
//!
//! A project is scored against every [`TypePattern`] using four signals
//! (matching files, dependencies, root config files, `package.json` fields).
//! The winner is the argmax of `score * priority / 10`; its confidence is its
//! raw score relative to the best score its pattern could reach. Results below
//! the confidence floor degrade to [`LibraryType::Mixed`].
//!
//! Detection never fails: any error yields a low-confidence
//! [`LibraryType::Typescript`] result carrying an [`EvidenceKind::Error`] entry.

mod patterns;
pub(crate) mod scan;

pub use patterns::{PATTERNS, TypePattern, pattern_for};

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};
use kiln_config::{DetectionSettings, LibraryType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{Cache, Lru};
use crate::{Error, Result};
use patterns::{CONFIG_FACTOR, DEPENDENCY_FACTOR, FIELD_FACTOR, FILE_FACTOR};
use scan::ProjectScan;

const ERROR_CONFIDENCE: f64 = 0.1;
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    File,
    Dependency,
    Config,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvidence {
    pub kind: EvidenceKind,
    pub description: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl DetectionEvidence {
    fn new(kind: EvidenceKind, description: impl Into<String>, weight: f64) -> Self {
        Self {
            kind,
            description: description.into(),
            weight,
            source: None,
        }
    }

    fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Score of one library type, for explaining a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub library_type: LibraryType,
    pub score: f64,
    pub weighted_score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub library_type: LibraryType,
    pub confidence: f64,
    pub evidence: Vec<DetectionEvidence>,
    /// Every type that scored, best first. Empty for fast-path and error results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
}

impl DetectionResult {
    fn fallback(reason: impl Into<String>) -> Self {
        Self {
            library_type: LibraryType::Typescript,
            confidence: ERROR_CONFIDENCE,
            evidence: vec![DetectionEvidence::new(
                EvidenceKind::Error,
                reason,
                0.0,
            )],
            candidates: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.evidence.iter().any(|e| e.kind == EvidenceKind::Error)
    }
}

#[derive(Debug, Clone)]
pub struct DetectorOptions {
    /// Results below this confidence become [`LibraryType::Mixed`].
    pub min_confidence: f64,
    pub cache: bool,
    pub cache_capacity: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            cache: false,
            cache_capacity: 32,
        }
    }
}

impl From<&DetectionSettings> for DetectorOptions {
    fn from(settings: &DetectionSettings) -> Self {
        Self {
            min_confidence: settings.min_confidence,
            cache: settings.cache,
            ..Self::default()
        }
    }
}

pub struct LibraryTypeDetector {
    options: DetectorOptions,
    cache: Option<Cache<String, DetectionResult, Lru<String>>>,
}

impl Default for LibraryTypeDetector {
    fn default() -> Self {
        Self::new(DetectorOptions::default())
    }
}

impl std::fmt::Debug for LibraryTypeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryTypeDetector")
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish()
    }
}

impl LibraryTypeDetector {
    pub fn new(options: DetectorOptions) -> Self {
        let cache = options
            .cache
            .then(|| Cache::new(options.cache_capacity, Lru::default()));
        Self { options, cache }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Classify the project at `root`.
    pub async fn detect(&self, root: impl AsRef<Path>) -> DetectionResult {
        let root = root.as_ref().to_path_buf();
        let key = self.cache.as_ref().map(|_| cache_key(&root));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                debug!(root = %root.display(), "Detection cache hit");
                return hit;
            }
        }

        let min_confidence = self.options.min_confidence;
        let task_root = root.clone();
        let outcome =
            tokio::task::spawn_blocking(move || analyze(&task_root, min_confidence)).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(root = %root.display(), "Library type detection failed: {err}");
                return DetectionResult::fallback(format!("Detection failed: {err}"));
            }
            Err(err) => {
                warn!(root = %root.display(), "Library type detection task failed: {err}");
                return DetectionResult::fallback(format!("Detection task failed: {err}"));
            }
        };

        info!(
            library_type = %result.library_type,
            confidence = result.confidence,
            "Detected library type"
        );

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, result.clone());
        }
        result
    }

    /// Synchronous variant for callers outside a runtime.
    pub fn detect_blocking(&self, root: impl AsRef<Path>) -> DetectionResult {
        let root = root.as_ref();
        analyze(root, self.options.min_confidence).unwrap_or_else(|err| {
            warn!(root = %root.display(), "Library type detection failed: {err}");
            DetectionResult::fallback(format!("Detection failed: {err}"))
        })
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, Cache::len)
    }
}

fn cache_key(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mtime = |path: PathBuf| -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    };
    format!(
        "{}|{:?}|{:?}",
        canonical.display(),
        mtime(canonical.join("package.json")),
        mtime(canonical.clone()),
    )
}

/// Score `root` against every pattern.
///
/// Confidence is the winner's raw score divided by the highest score its own
/// pattern can reach ([`TypePattern::max_score`]), not a share of the scores
/// across types: a lone weak signal stays weak even without competitors.
fn analyze(root: &Path, min_confidence: f64) -> Result<DetectionResult> {
    let scan = ProjectScan::collect(root)?;

    if let Some(result) = vue_fast_path(&scan) {
        return Ok(result);
    }

    let mut scored = Vec::with_capacity(PATTERNS.len());
    for pattern in PATTERNS {
        scored.push(score_pattern(pattern, &scan)?);
    }

    let mut best: Option<&Scored> = None;
    for candidate in &scored {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let delta = candidate.weighted() - current.weighted();
                let wins = delta > SCORE_EPSILON
                    || (delta.abs() <= SCORE_EPSILON
                        && candidate.pattern.priority > current.pattern.priority);
                Some(if wins { candidate } else { current })
            }
        };
    }

    let mut candidates: Vec<Candidate> = scored
        .iter()
        .filter(|s| s.score > 0.0)
        .map(Scored::candidate)
        .collect();
    candidates.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));

    let Some(best) = best.filter(|b| b.score > 0.0) else {
        debug!(root = %root.display(), "No library type evidence found");
        return Ok(DetectionResult {
            library_type: LibraryType::Mixed,
            confidence: 0.0,
            evidence: Vec::new(),
            candidates,
        });
    };

    let confidence = best.confidence();
    let library_type = if confidence < min_confidence {
        debug!(
            would_be = %best.pattern.library_type,
            confidence,
            min_confidence,
            "Confidence below floor, falling back to mixed"
        );
        LibraryType::Mixed
    } else {
        best.pattern.library_type
    };

    Ok(DetectionResult {
        library_type,
        confidence,
        evidence: best.evidence.clone(),
        candidates,
    })
}

struct Scored {
    pattern: &'static TypePattern,
    score: f64,
    evidence: Vec<DetectionEvidence>,
}

impl Scored {
    fn weighted(&self) -> f64 {
        self.score * self.pattern.priority_factor()
    }

    fn confidence(&self) -> f64 {
        let max = self.pattern.max_score();
        if max <= 0.0 {
            0.0
        } else {
            (self.score / max).clamp(0.0, 1.0)
        }
    }

    fn candidate(&self) -> Candidate {
        Candidate {
            library_type: self.pattern.library_type,
            score: self.score,
            weighted_score: self.weighted(),
            confidence: self.confidence(),
        }
    }
}

fn score_pattern(pattern: &'static TypePattern, scan: &ProjectScan) -> Result<Scored> {
    let mut score = 0.0;
    let mut evidence = Vec::new();
    let weight = pattern.weight;

    if !pattern.files.is_empty() {
        let globs = pattern
            .files
            .iter()
            .map(|raw| {
                Pattern::new(raw)
                    .map_err(|e| Error::config(format!("Invalid detection glob '{raw}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let matched: Vec<&String> = scan
            .files
            .iter()
            .filter(|file| globs.iter().any(|g| g.matches_with(file, options)))
            .collect();

        if let Some(first) = matched.first() {
            let contribution = (matched.len() as f64 * 0.1).min(1.0) * weight * FILE_FACTOR;
            score += contribution;
            evidence.push(
                DetectionEvidence::new(
                    EvidenceKind::File,
                    format!(
                        "{} file(s) matching {}",
                        matched.len(),
                        pattern.files.join(", ")
                    ),
                    contribution,
                )
                .with_source(first.as_str()),
            );
        }
    }

    if !pattern.dependencies.is_empty() {
        let matched: Vec<&str> = pattern
            .dependencies
            .iter()
            .copied()
            .filter(|dep| scan.dependencies.contains_key(*dep))
            .collect();
        if !matched.is_empty() {
            let ratio = matched.len() as f64 / pattern.dependencies.len() as f64;
            let contribution = ratio * weight * DEPENDENCY_FACTOR;
            score += contribution;
            for dep in matched {
                evidence.push(
                    DetectionEvidence::new(
                        EvidenceKind::Dependency,
                        format!("depends on {dep}"),
                        contribution,
                    )
                    .with_source("package.json"),
                );
            }
        }
    }

    if !pattern.configs.is_empty() {
        let found: Vec<&str> = pattern
            .configs
            .iter()
            .copied()
            .filter(|config| scan.has_root_file(config))
            .collect();
        if !found.is_empty() {
            let ratio = found.len() as f64 / pattern.configs.len() as f64;
            let contribution = ratio * weight * CONFIG_FACTOR;
            score += contribution;
            for config in found {
                evidence.push(
                    DetectionEvidence::new(
                        EvidenceKind::Config,
                        format!("found {config}"),
                        contribution,
                    )
                    .with_source(config),
                );
            }
        }
    }

    if !pattern.package_fields.is_empty() {
        let found: Vec<&str> = pattern
            .package_fields
            .iter()
            .copied()
            .filter(|field| scan.package_fields.contains(*field))
            .collect();
        if !found.is_empty() {
            let ratio = found.len() as f64 / pattern.package_fields.len() as f64;
            let contribution = ratio * weight * FIELD_FACTOR;
            score += contribution;
            evidence.push(
                DetectionEvidence::new(
                    EvidenceKind::Config,
                    format!("package.json declares {}", found.join(", ")),
                    contribution,
                )
                .with_source("package.json"),
            );
        }
    }

    Ok(Scored {
        pattern,
        score,
        evidence,
    })
}

static RANGE_MAJOR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\D*(\d+)").ok());

/// Major version named by a semver range such as `^2.7.0` or `>=3`.
pub fn range_major(range: &str) -> Option<u64> {
    RANGE_MAJOR
        .as_ref()?
        .captures(range.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn vue_fast_path(scan: &ProjectScan) -> Option<DetectionResult> {
    let vue_files = scan.vue_files();
    let first = vue_files.first()?;

    let range = scan.dependencies.get("vue");
    let library_type = match range.and_then(|r| range_major(r)) {
        Some(major) if major <= 2 => LibraryType::Vue2,
        _ => LibraryType::Vue3,
    };

    let mut evidence = vec![
        DetectionEvidence::new(
            EvidenceKind::File,
            format!("{} single-file component(s)", vue_files.len()),
            1.0,
        )
        .with_source(*first),
    ];
    if let Some(range) = range {
        evidence.push(
            DetectionEvidence::new(EvidenceKind::Dependency, format!("vue@{range}"), 1.0)
                .with_source("package.json"),
        );
    }

    Some(DetectionResult {
        library_type,
        confidence: 1.0,
        evidence,
        candidates: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn confidence_is_relative_to_the_winning_pattern() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "acme", "devDependencies": { "typescript": "^5.4.0" } }"#,
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export const a = 1;\n").unwrap();

        let result = analyze(dir.path(), 0.0).unwrap();
        let winner = result
            .candidates
            .iter()
            .find(|c| c.library_type == result.library_type)
            .unwrap();
        let max = pattern_for(result.library_type).unwrap().max_score();
        assert!((result.confidence - winner.score / max).abs() < 1e-9);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn parses_range_majors() {
        assert_eq!(range_major("^2.7.14"), Some(2));
        assert_eq!(range_major(">=3.0.0 <4"), Some(3));
        assert_eq!(range_major("~3.4"), Some(3));
        assert_eq!(range_major("workspace:*"), None);
        assert_eq!(range_major("latest"), None);
    }

    #[test]
    fn fallback_is_low_confidence_typescript() {
        let result = DetectionResult::fallback("boom");
        assert_eq!(result.library_type, LibraryType::Typescript);
        assert!((result.confidence - 0.1).abs() < f64::EPSILON);
        assert!(result.is_fallback());
    }

    #[test]
    fn blocking_detection_of_missing_root_falls_back() {
        let detector = LibraryTypeDetector::default();
        let result = detector.detect_blocking("/definitely/not/a/project");
        assert!(result.is_fallback());
    }
}
