//! Sizes, durations and the summaries printed after each command.

use std::time::Duration;

use console::Term;
use kiln_bundler::{BuildResult, DetectionResult, StageStatus, ValidationSummary};
use owo_colors::Style;

use super::messages::paint;

/// Human-readable byte count.
///
/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// Human-readable duration: `ms` below a second, seconds below a minute.
///
/// ```
/// use std::time::Duration;
/// use kiln_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

fn rule() -> String {
    let width = Term::stderr().size().1 as usize;
    "─".repeat(width.clamp(20, 80))
}

/// Table of emitted files, grouped by format, with gzip sizes and totals.
pub fn print_build_summary(result: &BuildResult) {
    eprintln!(
        "\n{} {}",
        paint("Build Summary", Style::new().bold().underline()),
        paint(&format!("({}, {})", result.library_type, result.mode), Style::new().dimmed())
    );
    eprintln!("{}", rule());

    let mut outputs: Vec<_> = result.outputs.iter().collect();
    outputs.sort_by(|a, b| a.format.cmp(&b.format).then_with(|| a.file_name.cmp(&b.file_name)));
    for artifact in outputs {
        let marker = if artifact.is_entry { "▸" } else { " " };
        eprintln!(
            "  {} {:<40} {:>10} {}",
            paint(marker, Style::new().blue()),
            paint(&artifact.file_name, Style::new().bright_white().bold()),
            format_size(artifact.size),
            paint(&format!("(gzip {})", format_size(artifact.gzip_size)), Style::new().dimmed())
        );
    }

    eprintln!("{}", rule());
    eprintln!(
        "  {} {} files, {} ({} gzip) in {}",
        paint("Total:", Style::new().bold()),
        result.stats.file_count,
        paint(&format_size(result.stats.total_size), Style::new().green()),
        format_size(result.stats.total_gzip_size),
        paint(
            &format_duration(Duration::from_millis(result.duration_ms)),
            Style::new().green()
        )
    );
    if !result.stats.externals.is_empty() {
        let externals: Vec<&str> = result.stats.externals.iter().map(String::as_str).collect();
        eprintln!("  {} {}", paint("External:", Style::new().bold()), externals.join(", "));
    }
    for warning in &result.warnings {
        super::warning(warning);
    }
}

pub fn print_detection(detection: &DetectionResult) {
    eprintln!(
        "{} {} {}",
        paint("Library type:", Style::new().bold()),
        paint(detection.library_type.as_str(), Style::new().green().bold()),
        paint(&format!("({:.0}% confidence)", detection.confidence * 100.0), Style::new().dimmed())
    );
    for evidence in &detection.evidence {
        let source = evidence
            .source
            .as_deref()
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        eprintln!("  - {}{}", evidence.description, paint(&source, Style::new().dimmed()));
    }
    if detection.candidates.len() > 1 {
        eprintln!("{}", paint("Other candidates:", Style::new().bold()));
        for candidate in detection.candidates.iter().skip(1).take(3) {
            eprintln!("  {:<12} {:.0}%", candidate.library_type.as_str(), candidate.confidence * 100.0);
        }
    }
}

/// One line per validation stage, then warnings and errors.
pub fn print_validation(summary: &ValidationSummary) {
    let verdict = if summary.success {
        paint("passed", Style::new().green().bold())
    } else {
        paint("failed", Style::new().red().bold())
    };
    let cached = if summary.cached { " (cached)" } else { "" };
    eprintln!("\n{} {verdict}{cached}", paint("Validation", Style::new().bold().underline()));

    for stage in &summary.stages {
        let mark = match stage.status {
            StageStatus::Passed => paint("PASS", Style::new().green()),
            StageStatus::Failed => paint("FAIL", Style::new().red()),
            StageStatus::Skipped => paint("SKIP", Style::new().dimmed()),
        };
        match &stage.detail {
            Some(detail) => eprintln!("  [{mark}] {} {}", stage.name, paint(detail, Style::new().dimmed())),
            None => eprintln!("  [{mark}] {}", stage.name),
        }
    }
    for warning in &summary.warnings {
        super::warning(warning);
    }
    for error in &summary.errors {
        super::error(error);
    }
}
