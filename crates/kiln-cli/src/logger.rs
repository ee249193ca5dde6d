//! Tracing subscriber setup for the kiln binary.
//!
//! `--verbose` turns on debug output for the kiln crates, `--quiet` limits
//! output to errors, and otherwise `RUST_LOG` wins over the default `info`.
//! Logs go to stderr so `--json` output on stdout stays parseable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "kiln=debug,kiln_cli=debug,kiln_bundler=debug,kiln_config=debug,kiln_validate=debug";
const QUIET_FILTER: &str = "error";
const DEFAULT_FILTER: &str = "warn,kiln=info,kiln_cli=info,kiln_bundler=info,kiln_config=info,kiln_validate=info";

/// The filter for the given flags. `verbose` wins over `quiet`.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Call once, before any logging.
///
/// ```rust,no_run
/// use kiln_cli::logger::init_logger;
///
/// init_logger(false, false, false);
/// tracing::info!("Starting build");
/// ```
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .try_init();
}

/// Whether stderr should get ANSI colors: `NO_COLOR` disables, `FORCE_COLOR`
/// forces, otherwise terminal detection decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_filters_build() {
        assert!(filter_for(true, false).to_string().contains("kiln_bundler=debug"));
        assert!(filter_for(false, true).to_string().contains("error"));
        assert!(filter_for(true, true).to_string().contains("debug"));
    }

    #[test]
    #[serial]
    fn test_no_color_wins_over_force_color() {
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_colors());
        unsafe {
            std::env::remove_var("NO_COLOR");
        }
        assert!(should_use_colors());
        unsafe {
            std::env::remove_var("FORCE_COLOR");
        }
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logger(false, true, true);
        init_logger(true, false, true);
    }
}
