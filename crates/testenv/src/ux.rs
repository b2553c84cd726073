//! Terminal output helpers.
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Prints a formatted error message to stderr.
pub fn present_error(error: anyhow::Error) {
    let error_text = style("ERROR:").red().bold();
    eprintln!("\n{error_text} {error:#}");
}

/// Prints a warning to stderr.
pub fn present_warning(message: &str) {
    let warning_text = style("WARNING:").yellow().bold();
    eprintln!("{warning_text} {message}");
}

/// A spinner shown while a long-running admin operation is in flight.
#[derive(Debug)]
pub struct OperationSpinner {
    spinner: ProgressBar,
}

impl OperationSpinner {
    pub fn new(msg: String) -> Self {
        let spinner = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::with_template("{spinner:.blue} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(spinner_style);
        spinner.set_message(msg);
        spinner.enable_steady_tick(Duration::from_millis(100));

        Self { spinner }
    }

    /// Stops the spinner and leaves `msg` in its place.
    pub fn finish(&self, msg: String) {
        self.spinner.finish_with_message(msg);
    }

    /// Stops the spinner and clears it from the terminal.
    pub fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}
