use clap::{Args, Subcommand};
use kiln_config::{BundlerKind, LibraryType, OutputFormat};
use std::path::PathBuf;

use crate::cli::enums::Stage;
use crate::cli::validation::{parse_confidence, parse_global};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a component library
    ///
    /// Detects the library type (unless --type is given), bundles every
    /// entry into the requested formats and writes them to the output
    /// directory. With --validate the emitted package is re-tested.
    Build(BuildArgs),

    /// Detect the library type of a project
    Detect(DetectArgs),

    /// Build a library and run the post-build validation stages
    ///
    /// The bundle is copied into a throwaway package, dependencies are
    /// installed, and the selected stages compare it with the sources.
    Validate(ValidateArgs),
}

/// Where the project lives and which config to read.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root directory
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Config file (kiln.toml or package.json); discovered in ROOT when omitted
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Config profile to apply on top of the base settings
    #[arg(short, long, value_name = "NAME")]
    pub profile: Option<String>,
}

/// Validation switches shared by `build --validate` and `validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidationArgs {
    /// Fail on the first stage that reports a discrepancy
    #[arg(long)]
    pub strict_validation: bool,

    /// Link the project's node_modules instead of installing dependencies
    #[arg(long)]
    pub no_install: bool,

    /// Replace the stored snapshot baseline with this build
    #[arg(long)]
    pub update_snapshots: bool,

    /// Keep the sandbox directory after validation
    #[arg(long)]
    pub keep_temp: bool,

    /// Only run these stages
    ///
    /// Examples:
    ///   --stages exports,imports
    ///   --stages snapshot
    #[arg(long, value_enum, value_delimiter = ',', value_name = "STAGE")]
    pub stages: Vec<Stage>,

    /// Test command to run in the sandbox instead of the `test` script
    #[arg(long, value_name = "CMD")]
    pub test_command: Option<String>,

    /// Snapshot store location
    #[arg(long, value_name = "FILE")]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Entry points, relative to ROOT (overrides the config)
    ///
    /// Examples:
    ///   kiln build --input src/index.ts
    ///   kiln build --input src/index.ts --input src/button.ts
    #[arg(short, long, value_name = "ENTRY")]
    pub input: Vec<String>,

    /// Output formats: esm, cjs, umd, iife
    #[arg(short, long, value_delimiter = ',', value_name = "FORMAT")]
    pub format: Vec<OutputFormat>,

    /// Output directory, relative to ROOT
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Library type; skips detection
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub library_type: Option<LibraryType>,

    /// Bundling engine
    #[arg(long, value_name = "ENGINE")]
    pub bundler: Option<BundlerKind>,

    /// Global name for UMD/IIFE bundles
    #[arg(short, long, value_parser = parse_global, value_name = "NAME")]
    pub name: Option<String>,

    /// Packages to keep out of the bundle
    ///
    /// Examples:
    ///   --external react --external react-dom
    ///   --external react,react-dom
    #[arg(short, long, value_delimiter = ',', value_name = "PACKAGE")]
    pub external: Vec<String>,

    /// Development build (no minification, readable output)
    #[arg(long)]
    pub dev: bool,

    /// Minify the output
    #[arg(short, long, conflicts_with = "dev")]
    pub minify: bool,

    /// Emit source maps
    #[arg(long)]
    pub sourcemap: bool,

    /// Remove the output directory before building
    #[arg(long)]
    pub clean: bool,

    /// Treat output warnings as errors
    #[arg(long)]
    pub strict: bool,

    /// Request type declarations
    #[arg(long)]
    pub dts: bool,

    /// Rebuild when sources change
    #[arg(short, long, conflicts_with = "validate")]
    pub watch: bool,

    /// Validate the emitted package after building
    #[arg(long)]
    pub validate: bool,

    #[command(flatten)]
    pub validation: ValidationArgs,

    /// Write a JSON build report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Print the build result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Project root directory
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Results below this confidence are reported as `mixed`
    #[arg(long, value_parser = parse_confidence, value_name = "0..1")]
    pub min_confidence: Option<f64>,

    /// Print the detection result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub validation: ValidationArgs,

    /// Write the validation report as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Print the validation summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}
