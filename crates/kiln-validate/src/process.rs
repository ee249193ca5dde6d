//! Subprocess execution with deadlines.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, ValidateError};

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// stdout followed by stderr, for parsers that read both streams.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run `program` in `cwd`, killing it when `limit` elapses.
pub async fn run(
    program: impl AsRef<Path>,
    args: &[String],
    cwd: &Path,
    limit: Duration,
) -> Result<ProcessOutput> {
    let program = program.as_ref();
    let command_display = command_line(program, args);
    debug!(command = %command_display, cwd = %cwd.display(), "Spawning");

    let started = Instant::now();
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("CI", "true")
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ValidateError::ToolUnavailable {
            tool: program.display().to_string(),
            reason: e.to_string(),
        })?;

    let output = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| ValidateError::Timeout {
            command: command_display.clone(),
            timeout: limit,
        })?
        .map_err(|e| ValidateError::Command {
            command: command_display,
            message: e.to_string(),
        })?;

    Ok(ProcessOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: started.elapsed(),
    })
}

/// The `node` executable, if installed.
pub fn find_node() -> Option<PathBuf> {
    which::which("node").ok()
}

/// Evaluate `script` with `node -e` in `cwd`; the script's stdout must be JSON.
pub async fn node_json(
    node: &Path,
    script: &str,
    cwd: &Path,
    limit: Duration,
) -> Result<serde_json::Value> {
    let args = vec!["-e".to_string(), script.to_string()];
    let output = run(node, &args, cwd, limit).await?;
    if !output.success {
        return Err(ValidateError::Command {
            command: "node -e".to_string(),
            message: first_line(&output.stderr)
                .unwrap_or("exited with a non-zero status")
                .to_string(),
        });
    }
    let json = output.stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("null");
    Ok(serde_json::from_str(json)?)
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

fn command_line(program: &Path, args: &[String]) -> String {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    let mut line = name;
    for arg in args {
        line.push(' ');
        if arg.len() > 40 {
            line.push_str("<script>");
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_arguments_are_elided_from_command_lines() {
        let args = vec!["-e".to_string(), "x".repeat(100)];
        assert_eq!(command_line(Path::new("/usr/bin/node"), &args), "node -e <script>");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = run(dir.path().join("nope"), &[], dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::ToolUnavailable { .. }));
    }
}
