//! Package manager and test runner detection, and test output parsing.
//!
//! The sandboxed project's own test command is run as-is. Output parsing
//! understands the summary lines of jest, vitest, mocha and TAP producers
//! (`node --test`, `tap`) plus istanbul's text coverage table; anything else
//! falls back to the exit status.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The script npm writes into fresh `package.json` files.
const NPM_PLACEHOLDER_TEST: &str = "no test specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    /// From the `packageManager` field, then lockfiles; npm when inconclusive.
    pub fn detect(root: &Path) -> Self {
        let declared = read_manifest(root)
            .as_ref()
            .and_then(|m| m.get("packageManager"))
            .and_then(Value::as_str)
            .and_then(|spec| Self::from_name(spec.split('@').next().unwrap_or(spec)));
        if let Some(manager) = declared {
            return manager;
        }

        const LOCKFILES: [(&str, PackageManager); 5] = [
            ("pnpm-lock.yaml", PackageManager::Pnpm),
            ("yarn.lock", PackageManager::Yarn),
            ("bun.lockb", PackageManager::Bun),
            ("bun.lock", PackageManager::Bun),
            ("package-lock.json", PackageManager::Npm),
        ];
        LOCKFILES
            .iter()
            .find(|(file, _)| root.join(file).is_file())
            .map(|(_, manager)| *manager)
            .unwrap_or(PackageManager::Npm)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "npm" => Some(PackageManager::Npm),
            "pnpm" => Some(PackageManager::Pnpm),
            "yarn" => Some(PackageManager::Yarn),
            "bun" => Some(PackageManager::Bun),
            _ => None,
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Bun => "bun",
        }
    }

    pub fn install_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            PackageManager::Npm => &["install", "--no-audit", "--no-fund", "--ignore-scripts"],
            PackageManager::Pnpm => &["install", "--ignore-scripts"],
            PackageManager::Yarn => &["install", "--ignore-scripts"],
            PackageManager::Bun => &["install", "--ignore-scripts"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Runs the `test` script, never the manager's built-in runner.
    pub fn test_args(&self) -> Vec<String> {
        match self {
            PackageManager::Bun => vec!["run".to_string(), "test".to_string()],
            _ => vec!["test".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFramework {
    Jest,
    Vitest,
    Mocha,
    Tap,
    #[default]
    Unknown,
}

impl TestFramework {
    /// Guess from the test script, then from dev dependencies.
    pub fn detect(manifest: &Value) -> Self {
        let script = manifest
            .pointer("/scripts/test")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let from_text = |text: &str| {
            if text.contains("vitest") {
                Some(TestFramework::Vitest)
            } else if text.contains("jest") {
                Some(TestFramework::Jest)
            } else if text.contains("mocha") {
                Some(TestFramework::Mocha)
            } else if text.contains("node --test") || text.contains("tap") || text.contains("ava") {
                Some(TestFramework::Tap)
            } else {
                None
            }
        };
        if let Some(framework) = from_text(script) {
            return framework;
        }
        ["devDependencies", "dependencies"]
            .iter()
            .filter_map(|field| manifest.get(field).and_then(Value::as_object))
            .flat_map(|deps| deps.keys())
            .find_map(|name| from_text(name))
            .unwrap_or_default()
    }
}

/// A concrete command to run the sandbox's tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
    pub framework: TestFramework,
}

impl TestCommand {
    /// Parse a user override such as `"pnpm vitest run"`.
    pub fn parse(command: &str, framework: TestFramework) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            framework,
        })
    }

    /// The command for the project at `root`, or `None` when it has no tests.
    pub fn resolve(root: &Path, override_command: Option<&str>) -> Option<Self> {
        let manifest = read_manifest(root).unwrap_or(Value::Null);
        let framework = TestFramework::detect(&manifest);
        if let Some(command) = override_command {
            return Self::parse(command, framework);
        }

        let script = manifest.pointer("/scripts/test").and_then(Value::as_str)?;
        if script.trim().is_empty() || script.contains(NPM_PLACEHOLDER_TEST) {
            return None;
        }
        let manager = PackageManager::detect(root);
        Some(Self {
            program: manager.program().to_string(),
            args: manager.test_args(),
            framework,
        })
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

/// Percentages from the `All files` coverage row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub statements: f64,
    pub branches: f64,
    pub functions: f64,
    pub lines: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResult {
    pub success: bool,
    pub framework: TestFramework,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    pub duration_ms: u64,
    pub tests: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    /// Whether a summary line was recognized.
    pub parsed: bool,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($re).ok());
    };
}

pattern!(ANSI, r"\x1b\[[0-9;?]*[A-Za-z]");
pattern!(JEST_SUMMARY, r"(?m)^\s*Tests:\s+(.+?)\s*$");
pattern!(VITEST_SUMMARY, r"(?m)^\s*Tests\s+(.+?)\s*\((\d+)\)\s*$");
pattern!(COUNT, r"(\d+)\s+(passed|failed|skipped|todo|pending|total)");
pattern!(MOCHA_COUNT, r"(?m)^\s*(\d+)\s+(passing|failing|pending)\b");
pattern!(TAP_COUNT, r"(?m)^#\s*(pass|fail|skip|todo|tests)\s+(\d+)\s*$");
pattern!(TEST_LINE, r"(?m)^\s*(✓|√|✔|✕|×|✗|○|↓)\s+(.+?)(?:\s+\((\d+(?:\.\d+)?)\s*ms\)|\s+(\d+(?:\.\d+)?)ms)?\s*$");
pattern!(TAP_LINE, r"(?m)^\s*(ok|not ok)\s+\d+\s+-?\s*(.+?)(\s+#\s*(?i:skip|todo).*)?$");
pattern!(COVERAGE_ROW, r"(?m)^\s*All files\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)");

fn strip_ansi(text: &str) -> String {
    match ANSI.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Structure `output` from a test run that exited with `exit_success`.
pub fn parse_test_output(
    output: &str,
    framework: TestFramework,
    exit_success: bool,
    duration_ms: u64,
) -> TestRunResult {
    let clean = strip_ansi(output);
    let mut result = TestRunResult {
        framework,
        duration_ms,
        ..TestRunResult::default()
    };

    result.parsed = parse_summary(&clean, &mut result);
    result.tests = parse_cases(&clean);
    result.coverage = parse_coverage(&clean);

    if !result.parsed && !result.tests.is_empty() {
        for case in &result.tests {
            match case.status {
                TestStatus::Passed => result.passed += 1,
                TestStatus::Failed => result.failed += 1,
                TestStatus::Skipped => result.skipped += 1,
            }
        }
        result.parsed = true;
    }
    if result.total == 0 {
        result.total = result.passed + result.failed + result.skipped;
    }
    result.success = exit_success && result.failed == 0;
    result
}

fn parse_summary(text: &str, result: &mut TestRunResult) -> bool {
    if let Some(caps) = VITEST_SUMMARY.as_ref().and_then(|re| re.captures(text)) {
        apply_counts(&caps[1], result);
        result.total = caps[2].parse().unwrap_or(result.total);
        return true;
    }
    if let Some(caps) = JEST_SUMMARY.as_ref().and_then(|re| re.captures(text)) {
        apply_counts(&caps[1], result);
        return true;
    }

    let mut found = false;
    if let Some(re) = MOCHA_COUNT.as_ref() {
        for caps in re.captures_iter(text) {
            let count: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passing" => result.passed = count,
                "failing" => result.failed = count,
                _ => result.skipped = count,
            }
            found = true;
        }
    }
    if found {
        return true;
    }

    if let Some(re) = TAP_COUNT.as_ref() {
        for caps in re.captures_iter(text) {
            let count: u32 = caps[2].parse().unwrap_or(0);
            match &caps[1] {
                "pass" => result.passed = count,
                "fail" => result.failed = count,
                "tests" => result.total = count,
                _ => result.skipped += count,
            }
            found = true;
        }
    }
    found
}

fn apply_counts(summary: &str, result: &mut TestRunResult) {
    let Some(re) = COUNT.as_ref() else {
        return;
    };
    for caps in re.captures_iter(summary) {
        let count: u32 = caps[1].parse().unwrap_or(0);
        match &caps[2] {
            "passed" => result.passed = count,
            "failed" => result.failed = count,
            "total" => result.total = count,
            _ => result.skipped += count,
        }
    }
}

fn parse_cases(text: &str) -> Vec<TestCase> {
    let mut cases = Vec::new();
    if let Some(re) = TEST_LINE.as_ref() {
        for caps in re.captures_iter(text) {
            let status = match &caps[1] {
                "✓" | "√" | "✔" => TestStatus::Passed,
                "○" | "↓" => TestStatus::Skipped,
                _ => TestStatus::Failed,
            };
            let duration_ms = caps
                .get(3)
                .or_else(|| caps.get(4))
                .and_then(|m| m.as_str().parse().ok());
            cases.push(TestCase {
                name: caps[2].trim().to_string(),
                status,
                duration_ms,
            });
        }
    }
    if !cases.is_empty() {
        return cases;
    }

    if let Some(re) = TAP_LINE.as_ref() {
        for caps in re.captures_iter(text) {
            let status = if caps.get(3).is_some() {
                TestStatus::Skipped
            } else if &caps[1] == "ok" {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            cases.push(TestCase {
                name: caps[2].trim().to_string(),
                status,
                duration_ms: None,
            });
        }
    }
    cases
}

fn parse_coverage(text: &str) -> Option<Coverage> {
    let caps = COVERAGE_ROW.as_ref()?.captures(text)?;
    Some(Coverage {
        statements: caps[1].parse().ok()?,
        branches: caps[2].parse().ok()?,
        functions: caps[3].parse().ok()?,
        lines: caps[4].parse().ok()?,
    })
}

pub(crate) fn read_manifest(root: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(root.join("package.json")).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn package_manager_field_beats_lockfiles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(PackageManager::detect(dir.path()), PackageManager::Yarn);

        fs::write(
            dir.path().join("package.json"),
            r#"{"packageManager":"pnpm@9.1.0"}"#,
        )
        .unwrap();
        assert_eq!(PackageManager::detect(dir.path()), PackageManager::Pnpm);
    }

    #[test]
    fn inconclusive_detection_falls_back_to_npm() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(dir.path()), PackageManager::Npm);
    }

    #[test]
    fn placeholder_test_script_means_no_tests() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"scripts":{"test":"echo \"Error: no test specified\" && exit 1"}}"#,
        )
        .unwrap();
        assert!(TestCommand::resolve(dir.path(), None).is_none());

        fs::write(
            dir.path().join("package.json"),
            r#"{"scripts":{"test":"vitest run"},"devDependencies":{"vitest":"^1"}}"#,
        )
        .unwrap();
        let command = TestCommand::resolve(dir.path(), None).unwrap();
        assert_eq!(command.display(), "npm test");
        assert_eq!(command.framework, TestFramework::Vitest);

        let custom = TestCommand::resolve(dir.path(), Some("pnpm vitest run --reporter=dot")).unwrap();
        assert_eq!(custom.program, "pnpm");
        assert_eq!(custom.args, ["vitest", "run", "--reporter=dot"]);
    }

    #[test]
    fn parses_jest_summary_and_cases() {
        let output = "\
PASS src/math.test.ts
  \u{1b}[32m✓\u{1b}[39m adds numbers (3 ms)
  ✕ subtracts numbers (1 ms)
  ○ skipped divides

Tests:       1 failed, 1 skipped, 1 passed, 3 total
Time:        0.812 s
";
        let result = parse_test_output(output, TestFramework::Jest, false, 900);
        assert!(result.parsed);
        assert_eq!((result.passed, result.failed, result.skipped, result.total), (1, 1, 1, 3));
        assert_eq!(result.tests.len(), 3);
        assert_eq!(result.tests[0].name, "adds numbers");
        assert_eq!(result.tests[0].duration_ms, Some(3.0));
        assert_eq!(result.tests[1].status, TestStatus::Failed);
        assert!(!result.success);
    }

    #[test]
    fn parses_vitest_summary_with_coverage() {
        let output = "\
 ✓ src/add.test.ts (2 tests) 4ms

 Test Files  1 passed (1)
      Tests  2 passed (2)

----------|---------|----------|---------|---------|
File      | % Stmts | % Branch | % Funcs | % Lines |
----------|---------|----------|---------|---------|
All files |   91.66 |       75 |     100 |   91.66 |
";
        let result = parse_test_output(output, TestFramework::Vitest, true, 500);
        assert_eq!((result.passed, result.failed, result.total), (2, 0, 2));
        assert!(result.success);
        let coverage = result.coverage.unwrap();
        assert_eq!(coverage.statements, 91.66);
        assert_eq!(coverage.branches, 75.0);
        assert_eq!(coverage.functions, 100.0);
    }

    #[test]
    fn parses_mocha_and_tap_summaries() {
        let mocha = parse_test_output("  4 passing (12ms)\n  1 failing\n", TestFramework::Mocha, false, 0);
        assert_eq!((mocha.passed, mocha.failed, mocha.total), (4, 1, 5));

        let tap = "TAP version 13\nok 1 - adds\nnot ok 2 - clamps\nok 3 - later # SKIP\n# tests 3\n# pass 1\n# fail 1\n# skip 1\n";
        let result = parse_test_output(tap, TestFramework::Tap, false, 0);
        assert_eq!((result.passed, result.failed, result.skipped, result.total), (1, 1, 1, 3));
        assert_eq!(result.tests.len(), 3);
        assert_eq!(result.tests[2].status, TestStatus::Skipped);
    }

    #[test]
    fn unknown_output_falls_back_to_exit_status() {
        let result = parse_test_output("all good\n", TestFramework::Unknown, true, 10);
        assert!(!result.parsed);
        assert!(result.success);
        assert_eq!(result.total, 0);
    }
}
