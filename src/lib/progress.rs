//! Progress tracking utilities
//!
//! This module provides a thread-safe progress tracker for logging progress at regular intervals.
//! The tracker maintains an internal count and logs when interval boundaries are crossed. With a
//! known total, it instead logs at 0.1% completion boundaries.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe progress tracker for logging progress at regular intervals.
///
/// Maintains an internal count and logs progress messages when the count crosses
/// interval boundaries, or 0.1% completion boundaries when a total is known.
/// Safe to use from multiple threads.
///
/// # Example
/// ```
/// use zmwalign_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Processed records")
///     .with_interval(100);
///
/// // Add items and log at interval boundaries
/// for _ in 0..250 {
///     tracker.log_if_needed(1);  // Logs at 100, 200
/// }
/// tracker.log_final();  // Logs "Processed records 250 (complete)"
/// ```
///
/// # Known-total Example
/// ```
/// use zmwalign_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Aligned wells").with_total(10_000);
/// tracker.log_if_needed(10);  // Logs "Aligned wells 0.1% (10/10000)"
/// ```
pub struct ProgressTracker {
    /// The logging interval - progress is logged when count crosses multiples of this.
    interval: u64,
    /// When known, progress is logged at 0.1% completion boundaries instead.
    total: Option<u64>,
    /// Message prefix for log output.
    message: String,
    /// Internal count of items processed (thread-safe).
    count: AtomicU64,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified message.
    ///
    /// The tracker starts with a count of 0 and a default interval of 10,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 10_000, total: None, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Set the logging interval.
    ///
    /// Progress will be logged each time the count crosses a multiple of this interval.
    /// Ignored when a total is set.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Set the expected final count, switching to percent logging at 0.1% steps.
    #[must_use]
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Add to the count and log if a boundary was crossed.
    ///
    /// This method is thread-safe and can be called from multiple threads.
    /// It atomically adds `additional` to the internal count and logs progress
    /// for each interval (or permille) boundary crossed.
    ///
    /// # Returns
    /// `true` if the final count is exactly on a boundary, which tells
    /// `log_final()` whether a closing message is still needed.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && self.on_boundary(count);
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;

        if let Some(total) = self.total {
            if total > 0 {
                let prev_permille = prev * 1000 / total;
                let new_permille = new_count * 1000 / total;
                if new_permille > prev_permille {
                    #[allow(clippy::cast_precision_loss)]
                    let percent = new_permille as f64 / 10.0;
                    info!("{} {percent:.1}% ({new_count}/{total})", self.message);
                }
            }
            return self.on_boundary(new_count);
        }

        // Log for each interval boundary crossed
        let prev_intervals = prev / self.interval;
        let new_intervals = new_count / self.interval;
        for i in (prev_intervals + 1)..=new_intervals {
            let milestone = i * self.interval;
            info!("{} {}", self.message, milestone);
        }

        new_count.is_multiple_of(self.interval)
    }

    fn on_boundary(&self, count: u64) -> bool {
        match self.total {
            Some(total) => count == total,
            None => count.is_multiple_of(self.interval),
        }
    }

    /// Log final progress.
    ///
    /// If the current count is not exactly on a boundary, logs a final message
    /// with "(complete)"; otherwise the last `log_if_needed` call already
    /// logged it.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    /// Get the current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
