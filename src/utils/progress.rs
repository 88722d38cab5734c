//! Progress reporting for long-running harvests.
//!
//! Reports go through `tracing` at `info` level every time the accumulated
//! record count crosses a multiple of the configured interval. Reporting is
//! purely observational.
//!
//! # Usage
//!
//! ```ignore
//! use undl_harvest::utils::ProgressReporter;
//!
//! let mut reporter = ProgressReporter::new("harvest", 1000);
//! reporter.set_total(Some(2500));
//! reporter.update(1200); // logs "1000"-crossing progress
//! reporter.finish(2500);
//! ```

use std::time::{Duration, Instant};

/// Default record-count interval between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

/// Record-count progress reporter
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    /// Name of the operation being tracked
    name: String,

    /// Records between two reports (0 disables periodic reports)
    interval: usize,

    /// Announced total, if known
    total: Option<u64>,

    /// Last interval multiple reported
    last_reported: usize,

    /// Start time for elapsed/ETA
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new(name: &str, interval: usize) -> Self {
        Self {
            name: name.to_string(),
            interval,
            total: None,
            last_reported: 0,
            start_time: Instant::now(),
        }
    }

    /// Create a reporter that only logs at finish
    pub fn quiet(name: &str) -> Self {
        Self::new(name, 0)
    }

    /// Record the announced total
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Report the current accumulated count; logs when an interval boundary was crossed
    pub fn update(&mut self, current: usize) -> bool {
        if self.interval == 0 {
            return false;
        }

        let boundary = current / self.interval * self.interval;
        if boundary == 0 || boundary <= self.last_reported {
            return false;
        }
        self.last_reported = boundary;

        let elapsed = Self::format_duration(self.start_time.elapsed());
        match self.total {
            Some(total) if total > 0 => {
                let percent = (current as f64 / total as f64 * 100.0).min(100.0);
                tracing::info!(
                    "{}: {} of {} records processed ({:.0}%, {} elapsed, ETA {})",
                    self.name,
                    current,
                    total,
                    percent,
                    elapsed,
                    Self::format_duration(self.estimate_eta(current, total))
                );
            }
            _ => {
                tracing::info!(
                    "{}: {} records processed ({} elapsed)",
                    self.name,
                    current,
                    elapsed
                );
            }
        }
        true
    }

    /// Estimate time remaining
    fn estimate_eta(&self, current: usize, total: u64) -> Duration {
        if current == 0 {
            return Duration::ZERO;
        }

        let per_unit_secs = self.start_time.elapsed().as_secs_f64() / current as f64;
        let remaining = total.saturating_sub(current as u64);

        Duration::from_secs_f64(per_unit_secs * remaining as f64)
    }

    /// Format duration for display
    fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();

        if secs >= 60 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}s", secs)
        }
    }

    /// Log final stats
    pub fn finish(&self, current: usize) {
        let elapsed = self.start_time.elapsed();
        let rate = current as f64 / elapsed.as_secs_f64().max(0.001);

        match self.total {
            Some(total) => tracing::info!(
                "{}: fetched {}/{} records in {} ({:.1} records/sec)",
                self.name,
                current,
                total,
                Self::format_duration(elapsed),
                rate
            ),
            None => tracing::info!(
                "{}: fetched {} records in {}",
                self.name,
                current,
                Self::format_duration(elapsed)
            ),
        }
    }
}
