//! # kiln-validate
//!
//! Post-build validation for kiln library builds.
//!
//! A [`Validator`] takes a finished [`kiln_bundler::BuildResult`], copies the
//! output into a [`TemporaryEnvironment`] that looks like a consumer install
//! of the package, and checks the bundle against its sources: exports and
//! imports, a generated smoke suite, the project's own tests, API shape,
//! load performance, self-referencing imports and an on-disk snapshot of the
//! emitted files.
//!
//! The validator plugs into the builder through
//! [`kiln_bundler::PostBuildValidator`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_bundler::{BuilderOptions, LibraryBuilder};
//! use kiln_validate::Validator;
//!
//! # #[tokio::main]
//! # async fn main() -> kiln_bundler::Result<()> {
//! let options = BuilderOptions::default().with_validator(Arc::new(Validator::default()));
//! let builder = LibraryBuilder::new(options);
//!
//! let mut config = kiln_bundler::BuilderConfig::new("./my-lib");
//! config.validation.enabled = true;
//! let result = builder.build(config).await?;
//! if let Some(validation) = &result.validation {
//!     println!("validation passed: {}", validation.success);
//! }
//! # Ok(()) }
//! ```

pub mod compare;
pub mod env;
pub mod error;
pub mod extract;
pub mod process;
pub mod report;
pub mod runner;
pub mod snapshot;
pub mod stage;
pub mod validator;

pub use env::{EnvironmentOptions, PackageEntries, TemporaryEnvironment};
pub use error::{Result, ValidateError};
pub use report::{ValidationReport, ValidationStats};
pub use runner::{PackageManager, TestCommand, TestFramework, TestRunResult};
pub use snapshot::{SnapshotDiff, SnapshotStore};
pub use stage::{StageReport, ValidationStage};
pub use validator::{ValidationContext, ValidationResult, Validator, ValidatorOptions};
