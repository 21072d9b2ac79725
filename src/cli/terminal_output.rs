//! Terminal output callback for step activity
//!
//! Prints a header when a step starts, each log line as it arrives, and the
//! step's exit code with a separator once it finishes.

use crate::execution::{LogCallback, StepEvent};
use console::style;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Callback that displays step activity in the terminal
#[derive(Debug)]
pub struct TerminalOutputCallback {
    /// Prefix each log line with its step label
    show_labels: bool,
    step_number: AtomicUsize,
    total_steps: usize,
}

impl TerminalOutputCallback {
    /// Create a new terminal output callback
    ///
    /// `total_steps` counts everything that will emit a start event,
    /// services included.
    pub fn new(show_labels: bool, total_steps: usize) -> Self {
        Self {
            show_labels,
            step_number: AtomicUsize::new(0),
            total_steps,
        }
    }

    /// Format: `[N/M] label (image)`
    fn print_step_header(&self, label: &str, image: &str) {
        let step_num = self.step_number.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "\n[{}/{}] {} {}",
            style(step_num).cyan(),
            style(self.total_steps).dim(),
            style(label).bold(),
            style(format!("({})", image)).dim()
        );
    }

    /// A horizontal rule spanning the terminal width
    fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }

    #[cfg(test)]
    fn started(&self) -> usize {
        self.step_number.load(Ordering::SeqCst)
    }
}

impl LogCallback for TerminalOutputCallback {
    fn on_event(&self, event: &StepEvent) {
        match event {
            StepEvent::Started { label, image } => self.print_step_header(label, image),
            StepEvent::Log { label, line } => {
                if self.show_labels {
                    println!("{} {}", style(label).dim(), line);
                } else {
                    println!("{}", line);
                }
            }
            StepEvent::Finished { label, exit_code } => {
                let code = if *exit_code == 0 {
                    style(exit_code.to_string()).green()
                } else {
                    style(exit_code.to_string()).red()
                };
                println!("{} exited with code {}", style(label).bold(), code);
                self.print_separator();
            }
        }
        self.flush_stdout();
    }
}
