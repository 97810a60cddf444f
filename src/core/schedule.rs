//! Daily operating window.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Daily window in fractional hours.
///
/// Windows that cross midnight are not supported: with `start >= stop` the
/// gate never opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// Opening hour, exclusive.
    pub start_fraction: f64,
    /// Closing hour, exclusive.
    pub stop_fraction: f64,
}

impl ScheduleWindow {
    /// Build a window, checking both bounds lie in `[0, 24)`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending bound.
    pub fn new(start_fraction: f64, stop_fraction: f64) -> Result<Self, String> {
        for (name, value) in [("start", start_fraction), ("stop", stop_fraction)] {
            if !(0.0..24.0).contains(&value) {
                return Err(format!("{name} time {value} must be within [0, 24)"));
            }
        }
        if start_fraction >= stop_fraction {
            warn!(
                start = start_fraction,
                stop = stop_fraction,
                "Schedule window crosses midnight or is empty; the station will never scan"
            );
        }
        Ok(Self {
            start_fraction,
            stop_fraction,
        })
    }

    /// Whether `current_fraction` lies strictly inside the window.
    #[must_use]
    pub fn contains(&self, current_fraction: f64) -> bool {
        self.start_fraction < current_fraction && current_fraction < self.stop_fraction
    }
}

/// Decide whether a scan should run now.
#[must_use]
pub fn should_scan(current_fraction: f64, window: &ScheduleWindow) -> bool {
    window.contains(current_fraction)
}
