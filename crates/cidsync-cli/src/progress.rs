use std::io::{self, Write};
use std::time::{Duration, Instant};

use cidsync_core::NormalizeSummary;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner that tracks rows normalized so far
pub struct RowSpinner {
    bar: ProgressBar,
    start: Instant,
}

impl RowSpinner {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_message(format!("{}...", label));
        RowSpinner {
            bar,
            start: Instant::now(),
        }
    }

    pub fn update(&mut self, summary: &NormalizeSummary) {
        self.bar.set_message(format!(
            "normalizing: {} rows ({} failed)",
            summary.rows_read, summary.failed
        ));
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
        let mut stderr = io::stderr().lock();
        let _ = writeln!(
            stderr,
            "  {} {:<44} {:>6.1}s",
            "✓".green(),
            "done",
            self.start.elapsed().as_secs_f64()
        );
    }
}

pub enum Progress {
    Interactive(RowSpinner),
    Silent,
}

impl Progress {
    pub fn new(interactive: bool, label: &str) -> Self {
        if interactive {
            Progress::Interactive(RowSpinner::new(label))
        } else {
            Progress::Silent
        }
    }

    pub fn update(&mut self, summary: &NormalizeSummary) {
        if let Progress::Interactive(s) = self {
            s.update(summary);
        }
    }

    pub fn finish(self) {
        if let Progress::Interactive(s) = self {
            s.finish();
        }
    }
}
