//! kiln CLI.
//!
//! Thin command layer over the kiln libraries:
//!
//! - [`cli`] - argument definitions (`kiln build`, `kiln detect`, `kiln validate`)
//! - [`commands`] - one module per subcommand
//! - [`error`] - CLI errors and their miette rendering
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - status lines, spinners and summaries on stderr
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
