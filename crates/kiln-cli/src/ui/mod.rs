//! Terminal output: status lines, a spinner, and build/validation summaries.
//!
//! Everything is written to stderr; stdout is reserved for `--json`.

mod format;
mod messages;
mod spinner;

use std::sync::atomic::{AtomicBool, Ordering};

pub use format::{format_duration, format_size, print_build_summary, print_detection, print_validation};
pub use messages::{error, info, success, warning};
pub use spinner::Spinner;

static COLORS: AtomicBool = AtomicBool::new(true);

/// Whether the process runs under a CI service.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "BUILDKITE"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Decide once whether styled output is used. `--no-color` always wins.
pub fn init_colors(no_color: bool) {
    COLORS.store(!no_color && crate::logger::should_use_colors(), Ordering::Relaxed);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}

/// Spinners only make sense on an attended terminal.
pub(crate) fn interactive() -> bool {
    !is_ci() && console::user_attended_stderr()
}
