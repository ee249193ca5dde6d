//! Shared enumerations used across the build pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The flavor of a library project; drives strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Typescript,
    Style,
    Vue2,
    Vue3,
    React,
    Svelte,
    Solid,
    Preact,
    Lit,
    Angular,
    Mixed,
}

impl LibraryType {
    /// Every library type in declaration order.
    pub const ALL: [LibraryType; 11] = [
        LibraryType::Typescript,
        LibraryType::Style,
        LibraryType::Vue2,
        LibraryType::Vue3,
        LibraryType::React,
        LibraryType::Svelte,
        LibraryType::Solid,
        LibraryType::Preact,
        LibraryType::Lit,
        LibraryType::Angular,
        LibraryType::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Typescript => "typescript",
            LibraryType::Style => "style",
            LibraryType::Vue2 => "vue2",
            LibraryType::Vue3 => "vue3",
            LibraryType::React => "react",
            LibraryType::Svelte => "svelte",
            LibraryType::Solid => "solid",
            LibraryType::Preact => "preact",
            LibraryType::Lit => "lit",
            LibraryType::Angular => "angular",
            LibraryType::Mixed => "mixed",
        }
    }

    /// Whether this type is backed by a UI framework runtime.
    pub fn is_framework(&self) -> bool {
        !matches!(
            self,
            LibraryType::Typescript | LibraryType::Style | LibraryType::Mixed
        )
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        LibraryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .or(match lowered.as_str() {
                "ts" => Some(LibraryType::Typescript),
                "vue" => Some(LibraryType::Vue3),
                "css" | "styles" => Some(LibraryType::Style),
                _ => None,
            })
            .ok_or_else(|| ConfigError::UnknownLibraryType(s.to_string()))
    }
}

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "es", alias = "module")]
    Esm,
    #[serde(alias = "commonjs")]
    Cjs,
    Umd,
    Iife,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Esm => "esm",
            OutputFormat::Cjs => "cjs",
            OutputFormat::Umd => "umd",
            OutputFormat::Iife => "iife",
        }
    }

    /// Directory under the output root that holds this format's files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            OutputFormat::Esm => "es",
            OutputFormat::Cjs => "cjs",
            OutputFormat::Umd => "umd",
            OutputFormat::Iife => "iife",
        }
    }

    /// UMD and IIFE bundle to a single file with a single global export.
    pub fn is_single_file(&self) -> bool {
        matches!(self, OutputFormat::Umd | OutputFormat::Iife)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "esm" | "es" | "module" => Ok(OutputFormat::Esm),
            "cjs" | "commonjs" => Ok(OutputFormat::Cjs),
            "umd" => Ok(OutputFormat::Umd),
            "iife" => Ok(OutputFormat::Iife),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

/// Which bundling engine backs the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlerKind {
    #[default]
    Rolldown,
    Esbuild,
}

impl BundlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundlerKind::Rolldown => "rolldown",
            BundlerKind::Esbuild => "esbuild",
        }
    }
}

impl fmt::Display for BundlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundlerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolldown" => Ok(BundlerKind::Rolldown),
            "esbuild" => Ok(BundlerKind::Esbuild),
            _ => Err(ConfigError::UnknownBundler(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Production => "production",
            BuildMode::Development => "development",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_type_parses_aliases() {
        assert_eq!("vue".parse::<LibraryType>().unwrap(), LibraryType::Vue3);
        assert_eq!("React".parse::<LibraryType>().unwrap(), LibraryType::React);
        assert_eq!("ts".parse::<LibraryType>().unwrap(), LibraryType::Typescript);
        assert!("elm".parse::<LibraryType>().is_err());
    }

    #[test]
    fn library_type_round_trips_through_serde() {
        let json = serde_json::to_string(&LibraryType::Vue2).unwrap();
        assert_eq!(json, "\"vue2\"");
        let back: LibraryType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LibraryType::Vue2);
    }

    #[test]
    fn output_format_accepts_es_alias() {
        let format: OutputFormat = serde_json::from_str("\"es\"").unwrap();
        assert_eq!(format, OutputFormat::Esm);
        assert_eq!(format.dir_name(), "es");
        assert!(OutputFormat::Umd.is_single_file());
        assert!(!OutputFormat::Cjs.is_single_file());
    }

    #[test]
    fn framework_classification() {
        assert!(LibraryType::React.is_framework());
        assert!(!LibraryType::Style.is_framework());
        assert!(!LibraryType::Mixed.is_framework());
    }
}
