//! Derived progress reporting for import sessions
//!
//! Computed on demand from the checkpoint counters and elapsed wall-clock
//! time; never persisted.

use std::time::Duration;

use crate::checkpoint::model::ImportPhase;

/// Point-in-time progress snapshot for an import session.
#[derive(Debug, Clone)]
pub struct ImportProgress {
    /// Current phase.
    pub phase: ImportPhase,
    /// Raw items fetched across all pages.
    pub fetched: u64,
    /// Items with a terminal outcome.
    pub processed: u64,
    /// Items imported into local storage.
    pub imported: u64,
    /// Items skipped.
    pub skipped: u64,
    /// Items failed.
    pub failed: u64,
    /// Fetched-but-unprocessed items.
    pub pending: u64,
    /// Wall-clock time since the session started.
    pub elapsed: Duration,
    /// Processing rate in items per second.
    pub items_per_second: f64,
    /// Projected remaining time, from the processed/elapsed ratio.
    pub estimated_remaining: Option<Duration>,
}

impl ImportProgress {
    /// Processing rate given a processed count and elapsed time.
    pub(crate) fn rate(processed: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Project remaining time for `remaining` items at the current rate.
    pub(crate) fn estimate_remaining(remaining: u64, rate: f64) -> Option<Duration> {
        if remaining == 0 || rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Human-readable one-line summary for logging.
    pub fn format_summary(&self) -> String {
        let mut parts = vec![format!(
            "[{}] processed {}/{} fetched ({} imported, {} skipped, {} failed)",
            self.phase, self.processed, self.fetched, self.imported, self.skipped, self.failed
        )];

        if self.items_per_second > 0.0 {
            parts.push(format!("at {:.1} items/sec", self.items_per_second));
        }

        if let Some(remaining) = self.estimated_remaining {
            parts.push(format!("~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
