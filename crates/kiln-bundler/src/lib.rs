#![cfg_attr(docsrs, feature(doc_cfg))]

//! # kiln-bundler
//!
//! Library builds orchestrated over interchangeable bundling engines.
//!
//! The pipeline is: [`LibraryTypeDetector`] classifies the project, a
//! [`BuildStrategy`] from the [`StrategyManager`] turns the user's
//! [`BuilderConfig`] into a [`UnifiedConfig`], and a [`BundlerAdapter`]
//! (in-process rolldown or the esbuild executable) produces enhanced
//! [`OutputArtifact`]s. [`LibraryBuilder`] wires the stages together and
//! optionally hands the result to a [`PostBuildValidator`].
//!
//! ```no_run
//! use kiln_bundler::{BuilderOptions, LibraryBuilder};
//! use kiln_config::{BuilderConfig, OutputFormat};
//!
//! # #[tokio::main]
//! # async fn main() -> kiln_bundler::Result<()> {
//! let builder = LibraryBuilder::new(BuilderOptions::default());
//! let config = BuilderConfig::new("./my-lib")
//!     .with_input("src/index.ts")
//!     .with_formats([OutputFormat::Esm, OutputFormat::Cjs]);
//!
//! let result = builder.build(config).await?;
//! for artifact in &result.outputs {
//!     println!("{} ({} bytes, {} gzip)", artifact.file_name, artifact.size, artifact.gzip_size);
//! }
//! # Ok(()) }
//! ```

pub mod adapter;
pub mod builder;
pub mod cache;
pub mod detect;
pub mod diagnostics;
pub mod output;
pub mod plugins;
pub mod report;
pub mod result;
pub mod strategy;
pub mod unified;
pub mod watch;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use adapter::{AdapterFeature, BundlerAdapter, FormatConfig, FormatPlan, create_adapter};
pub use builder::{
    BuildState, BuilderEvent, BuilderOptions, LibraryBuilder, PostBuildValidator,
};
pub use cache::{Cache, CacheStats, EvictionPolicy, Lfu, Lru, SizeBased, Ttl};
pub use detect::{
    DetectionEvidence, DetectionResult, DetectorOptions, EvidenceKind, LibraryTypeDetector,
};
pub use output::{ArtifactKind, BuildStats, FormatStats, OutputArtifact};
pub use plugins::{
    ChunkInfo, HookKind, HookSet, PluginDescriptor, PluginHooks, PluginProvider,
    PluginProviderRegistry, ResolvedId, UnifiedPlugin,
};
pub use result::{
    BuildPerformance, BuildResult, StageOutcome, StageStatus, ValidationSummary,
};
pub use strategy::{BuildStrategy, StrategyManager, StrategyValidation};
pub use unified::{External, PackageType, UnifiedConfig, UnifiedInput, UnifiedOutputConfig};
pub use watch::{BuildWatcher, WatchEvent};

pub use kiln_config::{
    BuildMode, BuilderConfig, BundlerKind, ConfigError, LibraryType, OutputFormat,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for kiln-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete build configuration.
    #[error("Invalid configuration: {message}")]
    Config {
        message: String,
        suggestion: Option<String>,
    },

    /// Entry globs expanded to nothing.
    #[error("No entry files matched {}", .patterns.join(", "))]
    NoEntryMatches { patterns: Vec<String> },

    /// Loading or parsing the configuration document failed.
    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    /// Engine invocation failed.
    #[error("Build failed: {message}")]
    Build {
        message: String,
        suggestion: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// A build finished without emitting any artifact.
    #[error("Build produced no output files")]
    EmptyOutput,

    /// Output warnings upgraded to errors in strict mode.
    #[error("Build output has {} problem(s): {}", .warnings.len(), .warnings.join("; "))]
    StrictWarnings { warnings: Vec<String> },

    /// The requested engine cannot be used on this machine.
    #[error("Bundler '{bundler}' is unavailable: {reason}")]
    AdapterUnavailable { bundler: BundlerKind, reason: String },

    /// The engine lacks a capability the config requires.
    #[error("Bundler '{bundler}' does not support {feature}")]
    UnsupportedFeature { bundler: BundlerKind, feature: String },

    /// A single plugin failed to load, initialize or run.
    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// Missing file/dir or permission problem.
    #[error("{message}: {}", .path.display())]
    Filesystem {
        path: std::path::PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// Post-build validation reported a failure.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("No build strategy registered for library type '{0}'")]
    StrategyNotFound(LibraryType),

    #[error("Strategy '{strategy}' is not applicable: {reason}")]
    StrategyNotApplicable { strategy: String, reason: String },

    #[error(
        "Bundle size {actual} bytes (gzip) exceeds the limit of {limit} bytes; largest files: {}",
        format_offenders(.offenders)
    )]
    SizeLimitExceeded {
        limit: u64,
        actual: u64,
        offenders: Vec<(String, u64)>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            suggestion: None,
        }
    }

    /// Wrap an engine failure, attaching a heuristic suggestion.
    pub fn build(message: impl Into<String>, source: Option<BoxError>) -> Self {
        let message = message.into();
        let suggestion = diagnostics::suggest(&message);
        Error::Build {
            message,
            suggestion,
            source,
        }
    }

    /// Create a build error from a rolldown error batch.
    pub fn from_rolldown_batch(error: &dyn std::fmt::Debug) -> Self {
        Error::build(diagnostics::extract_message(&format!("{error:?}")), None)
    }

    pub fn fs(path: impl Into<std::path::PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn validation(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Error::Validation {
            message: message.into(),
            source,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::NoEntryMatches { .. } => "CONFIG_NO_ENTRY_MATCHES",
            Error::ConfigFile(_) => "CONFIG_ERROR",
            Error::Build { .. } => "BUILD_ERROR",
            Error::EmptyOutput => "BUILD_EMPTY_OUTPUT",
            Error::StrictWarnings { .. } => "BUILD_STRICT_WARNINGS",
            Error::AdapterUnavailable { .. } => "ADAPTER_UNAVAILABLE",
            Error::UnsupportedFeature { .. } => "ADAPTER_UNSUPPORTED_FEATURE",
            Error::Plugin { .. } => "PLUGIN_ERROR",
            Error::Filesystem { .. } => "FS_ERROR",
            Error::InvalidOutputPath(_) => "FS_INVALID_OUTPUT_PATH",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::StrategyNotFound(_) => "STRATEGY_NOT_FOUND",
            Error::StrategyNotApplicable { .. } => "STRATEGY_NOT_APPLICABLE",
            Error::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    /// Human-oriented hint for fixing the problem, if one applies.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Config { suggestion, .. } | Error::Build { suggestion, .. } => {
                suggestion.clone()
            }
            Error::ConfigFile(err) => err.hint().map(str::to_string),
            Error::NoEntryMatches { .. } => Some(
                "Check the glob pattern; test, spec and .d.ts files are excluded from entries"
                    .to_string(),
            ),
            Error::EmptyOutput => Some(
                "Verify the entry files export something and are not fully tree-shaken".to_string(),
            ),
            Error::AdapterUnavailable { bundler, .. } => Some(match bundler {
                BundlerKind::Esbuild => {
                    "Install esbuild (npm i -D esbuild) or put it on PATH".to_string()
                }
                BundlerKind::Rolldown => "Rebuild kiln with rolldown support".to_string(),
            }),
            Error::StrategyNotFound(_) => Some(
                "Set `type` explicitly in kiln.toml or register a strategy for it".to_string(),
            ),
            Error::SizeLimitExceeded { .. } => Some(
                "Externalize large dependencies or raise performance.size_limit".to_string(),
            ),
            Error::Filesystem { .. } | Error::Io(_) => {
                Some("Check that the path exists and is readable/writable".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error originates from configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::NoEntryMatches { .. } | Error::ConfigFile(_)
        )
    }
}

fn format_offenders(offenders: &[(String, u64)]) -> String {
    offenders
        .iter()
        .map(|(name, size)| format!("{name} ({size} B)"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(Error::code(self)))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        self.suggestion()
            .map(|s| Box::new(s) as Box<dyn std::fmt::Display>)
    }
}
