//! Emitted artifacts and everything computed from them.

mod enhance;
mod stats;
mod validate;
pub mod writer;

pub use enhance::{content_hash, enhance, enhance_with, gzip_size};
pub use stats::{BuildStats, FormatStats, LargestArtifact};
pub use validate::validate_outputs;

use kiln_config::OutputFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Chunk,
    Asset,
}

/// One physical output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    /// Path relative to the output directory, including the format directory.
    pub file_name: String,
    pub size: u64,
    pub gzip_size: u64,
    /// SHA-256 hex of the emitted content.
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_entry: bool,
    pub is_dynamic_entry: bool,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    pub preserve_modules: bool,
    pub sourcemap: bool,
    #[serde(skip)]
    pub code: Option<String>,
    #[serde(skip)]
    pub source: Option<Vec<u8>>,
}

impl OutputArtifact {
    pub fn chunk(file_name: impl Into<String>, format: OutputFormat, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            file_name: file_name.into(),
            size: code.len() as u64,
            gzip_size: 0,
            hash: String::new(),
            kind: ArtifactKind::Chunk,
            format,
            name: None,
            is_entry: false,
            is_dynamic_entry: false,
            imports: Vec::new(),
            exports: Vec::new(),
            modules: Vec::new(),
            preserve_modules: false,
            sourcemap: false,
            code: Some(code),
            source: None,
        }
    }

    pub fn asset(file_name: impl Into<String>, format: OutputFormat, source: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            size: source.len() as u64,
            gzip_size: 0,
            hash: String::new(),
            kind: ArtifactKind::Asset,
            format,
            name: None,
            is_entry: false,
            is_dynamic_entry: false,
            imports: Vec::new(),
            exports: Vec::new(),
            modules: Vec::new(),
            preserve_modules: false,
            sourcemap: false,
            code: None,
            source: Some(source),
        }
    }

    /// Emitted content; empty once contents were dropped.
    pub fn bytes(&self) -> &[u8] {
        match (&self.code, &self.source) {
            (Some(code), _) => code.as_bytes(),
            (None, Some(source)) => source,
            (None, None) => &[],
        }
    }

    pub fn is_chunk(&self) -> bool {
        self.kind == ArtifactKind::Chunk
    }

    pub fn is_sourcemap(&self) -> bool {
        self.file_name.ends_with(".map")
    }

    pub fn set_code(&mut self, code: String) {
        self.size = code.len() as u64;
        self.code = Some(code);
    }
}
