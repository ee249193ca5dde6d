//! Configuration for the kiln library builder.
//!
//! [`BuilderConfig`] is the user-facing, framework-agnostic description of a
//! library build. It is loaded from `kiln.toml` (or the `kiln` field of
//! `package.json`) through [`ConfigDiscovery`], merged with profile overrides
//! and `KILN_*` environment variables, and validated with the strategies in
//! [`validation`].

pub mod builder;
pub mod config;
pub mod discovery;
pub mod error;
pub mod postbuild;
pub mod settings;
pub mod types;
pub mod validation;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use postbuild::*;
pub use settings::*;
pub use types::*;

pub use discovery::{ConfigDiscovery, discover, discover_with_profile};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};
