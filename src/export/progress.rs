//! Progress tracking for export operations
//!
//! Gives users live feedback while rows are being written: a spinner with the
//! number of rows rendered so far and the current throughput.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker for export operations
///
/// Owned by the stream writer, which is the only component that knows how
/// many rows have actually reached the document.
pub struct ProgressTracker {
    /// Start time of the operation
    start_time: Instant,
    /// Spinner (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a spinner
    ///
    /// # Returns
    /// * `Self` - New progress tracker instance
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} rows {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        Self {
            start_time: Instant::now(),
            bar,
        }
    }

    /// A tracker that never draws anything
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Update progress with new count
    ///
    /// # Arguments
    /// * `count` - Total number of rows rendered so far
    pub fn update(&mut self, count: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = count as f64 / elapsed;
                bar.set_message(format!("({:.0} rows/sec)", speed));
            }
        }
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
