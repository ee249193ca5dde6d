use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::Style;

use super::messages::paint;

/// Spinner for steps of unknown length. Hidden when stderr is not a
/// terminal, in which case only the final line is printed.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if super::interactive() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.done(format!("{} {message}", paint("✓", Style::new().green())));
    }

    pub fn fail(&self, message: &str) {
        self.done(format!("{} {message}", paint("✗", Style::new().red())));
    }

    fn done(&self, line: String) {
        if self.pb.is_hidden() {
            self.pb.finish_and_clear();
            eprintln!("{line}");
        } else {
            self.pb.finish_with_message(line);
        }
    }
}
