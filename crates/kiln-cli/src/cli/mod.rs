//! Command-line interface definition.
//!
//! - `kiln build` - detect, bundle and optionally validate a library
//! - `kiln detect` - report the detected library type and its evidence
//! - `kiln validate` - build and run the post-build validation stages

mod commands;
pub mod enums;
mod tests;
mod validation;

use clap::Parser;

pub use commands::{BuildArgs, Command, DetectArgs, ProjectArgs, ValidateArgs, ValidationArgs};
pub use enums::*;
pub use validation::parse_global;

/// kiln - build and verify JavaScript component libraries
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Build and verify JavaScript component libraries",
    long_about = "kiln detects the framework of a component library, bundles it into\n\
                  ESM, CJS, UMD and IIFE outputs, and re-tests the emitted package in an\n\
                  isolated sandbox before you publish it."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
