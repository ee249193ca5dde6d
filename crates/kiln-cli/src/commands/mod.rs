//! Subcommand implementations. Each module exposes an `execute` taking the
//! parsed arguments.

pub mod build;
pub mod detect;
pub(crate) mod utils;
pub mod validate;

pub use build::execute as build_execute;
pub use detect::execute as detect_execute;
pub use validate::execute as validate_execute;
