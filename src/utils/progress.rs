//! Progress bar helpers using indicatif

use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{SweepObserver, SweepStep};

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar for known-length operations
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("█▓▒░"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Finish a progress bar with a success message
pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✅ {}", message));
}

/// Finish a progress bar with a warning message
pub fn finish_with_warning(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("⚠️  {}", message));
}

/// H sweep observer driving a progress bar
pub struct SweepProgress {
    pb: ProgressBar,
}

impl SweepProgress {
    pub fn new() -> Self {
        Self {
            pb: create_progress_bar(0, "   Searching H"),
        }
    }

    /// Observer that draws nothing (e.g. `--no-progress`)
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }
}

impl Default for SweepProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepObserver for SweepProgress {
    fn on_start(&self, total: usize) {
        self.pb.set_length(total as u64);
        self.pb.set_position(0);
    }

    // inc() is thread-safe; steps arrive from the rayon pool
    fn on_step(&self, step: &SweepStep) {
        self.pb.inc(1);
        self.pb
            .set_message(format!("   Searching H (last: H={} -> {:.4})", step.h, step.imbalance));
    }

    fn on_finish(&self, selected: usize) {
        finish_with_success(&self.pb, &format!("Selected H = {}", selected));
    }
}
