//! One-line status messages on stderr.

use owo_colors::{OwoColorize, Style};

use super::colors_enabled;

pub(crate) fn paint(text: &str, style: Style) -> String {
    if colors_enabled() {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

pub fn success(message: &str) {
    eprintln!("{} {message}", paint("✓", Style::new().green().bold()));
}

pub fn info(message: &str) {
    eprintln!("{} {message}", paint("ℹ", Style::new().blue().bold()));
}

pub fn warning(message: &str) {
    eprintln!(
        "{} {}",
        paint("⚠", Style::new().yellow().bold()),
        paint(message, Style::new().yellow())
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        paint("✗", Style::new().red().bold()),
        paint(message, Style::new().red())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::init_colors;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_paint_without_colors_is_plain() {
        init_colors(true);
        assert_eq!(paint("ok", Style::new().green()), "ok");
        success("Success message");
        warning("Warning message");
        error("Error message");
        info("Info message");
    }
}
