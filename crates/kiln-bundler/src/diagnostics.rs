//! Heuristic classification of engine error messages.
//!
//! Engines report failures as free text. We classify the text by substring
//! and attach a suggestion for the user. The classification is advisory and
//! never used for control flow.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnresolvedImport,
    ParseError,
    MissingFile,
    OutOfMemory,
    Permission,
    MissingExport,
    CircularDependency,
    Other,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::UnresolvedImport => "UnresolvedImport",
            DiagnosticKind::ParseError => "ParseError",
            DiagnosticKind::MissingFile => "MissingFile",
            DiagnosticKind::OutOfMemory => "OutOfMemory",
            DiagnosticKind::Permission => "Permission",
            DiagnosticKind::MissingExport => "MissingExport",
            DiagnosticKind::CircularDependency => "CircularDependency",
            DiagnosticKind::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Classify an engine message.
pub fn classify(message: &str) -> DiagnosticKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("could not resolve")
        || lower.contains("cannot find module")
        || lower.contains("unresolved import")
        || lower.contains("unresolved_import")
        || lower.contains("failed to resolve")
    {
        DiagnosticKind::UnresolvedImport
    } else if lower.contains("enoent") || lower.contains("no such file") {
        DiagnosticKind::MissingFile
    } else if lower.contains("syntax")
        || lower.contains("parse error")
        || lower.contains("unexpected token")
        || lower.contains("expected")
    {
        DiagnosticKind::ParseError
    } else if lower.contains("out of memory")
        || lower.contains("heap limit")
        || lower.contains("allocation failed")
    {
        DiagnosticKind::OutOfMemory
    } else if lower.contains("eacces")
        || lower.contains("eperm")
        || lower.contains("permission denied")
    {
        DiagnosticKind::Permission
    } else if lower.contains("missing export") || lower.contains("is not exported") {
        DiagnosticKind::MissingExport
    } else if lower.contains("circular") {
        DiagnosticKind::CircularDependency
    } else {
        DiagnosticKind::Other
    }
}

/// Suggestion text for an engine message, if any heuristic matches.
pub fn suggest(message: &str) -> Option<String> {
    let hint = match classify(message) {
        DiagnosticKind::UnresolvedImport => {
            "Check the import path, or install the missing dependency and mark it external if it should not be bundled"
        }
        DiagnosticKind::ParseError => {
            "Check the file for syntax errors; the file type may need a framework plugin that is not configured"
        }
        DiagnosticKind::MissingFile => "Check that the referenced path exists relative to the project root",
        DiagnosticKind::OutOfMemory => {
            "Reduce the number of formats built at once or split the library into smaller entries"
        }
        DiagnosticKind::Permission => "Check file permissions of the project and output directories",
        DiagnosticKind::MissingExport => "Check that the imported name is exported by the target module",
        DiagnosticKind::CircularDependency => "Break the import cycle between the listed modules",
        DiagnosticKind::Other => return None,
    };
    Some(hint.to_string())
}

static MESSAGE_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"message:\s*"((?:[^"\\]|\\.)*)""#).ok());

/// Pull human-readable messages out of a debug-formatted engine error.
///
/// Falls back to the full text when no `message: "..."` field is present.
pub fn extract_message(debug: &str) -> String {
    let messages: Vec<String> = MESSAGE_FIELD
        .as_ref()
        .map(|re| {
            re.captures_iter(debug)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().replace("\\n", "\n").replace("\\\"", "\""))
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        debug.trim().to_string()
    } else {
        messages.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_engine_messages() {
        assert_eq!(
            classify("[UNRESOLVED_IMPORT] Could not resolve 'vue'"),
            DiagnosticKind::UnresolvedImport
        );
        assert_eq!(
            classify("ENOENT: no such file or directory"),
            DiagnosticKind::MissingFile
        );
        assert_eq!(
            classify("Unexpected token '<'"),
            DiagnosticKind::ParseError
        );
        assert_eq!(
            classify("FATAL ERROR: Reached heap limit Allocation failed"),
            DiagnosticKind::OutOfMemory
        );
        assert_eq!(classify("EACCES: permission denied"), DiagnosticKind::Permission);
        assert_eq!(classify("something odd"), DiagnosticKind::Other);
    }

    #[test]
    fn suggestion_only_for_known_kinds() {
        assert!(suggest("Cannot find module 'react'").is_some());
        assert!(suggest("weird").is_none());
    }

    #[test]
    fn extracts_debug_messages() {
        let debug = r#"BatchedBuildDiagnostic { diagnostics: [Diag { message: "Could not resolve \"x\"" }, Diag { message: "second" }] }"#;
        assert_eq!(extract_message(debug), "Could not resolve \"x\"; second");
        assert_eq!(extract_message("  plain  "), "plain");
    }
}
