//! Export window planning
//!
//! Windows are half-open `[from, to)` intervals. Each new window starts
//! exactly where the last committed one ended, so consecutive exports tile
//! the timeline with neither gaps nor overlaps.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::checkpoint::Checkpoint;
use crate::error::{ExportError, Result};

/// Half-open time interval `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window; `None` unless `from < to`
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.to.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Derives the next window to export from the last checkpoint
#[derive(Debug, Clone, Copy)]
pub struct WindowPlanner {
    duration: Duration,
}

impl WindowPlanner {
    /// Create a planner producing windows of `duration`.
    ///
    /// A non-positive duration falls back to one hour; configuration
    /// validation rejects those before they get here.
    pub fn new(duration: Duration) -> Self {
        let duration = if duration > Duration::zero() {
            duration
        } else {
            Duration::hours(1)
        };
        Self { duration }
    }

    /// Plan the next window.
    ///
    /// With a previous checkpoint the window starts at its end, whatever the
    /// current time. On cold start it starts at `now`: history before the
    /// first invocation is never backfilled.
    ///
    /// Fails when the window end is not representable, which only a corrupt
    /// checkpoint can cause.
    pub fn next_window(
        &self,
        previous: Option<&Checkpoint>,
        now: DateTime<Utc>,
    ) -> Result<TimeWindow> {
        let from = match previous {
            Some(checkpoint) => checkpoint.window_end,
            None => now,
        };
        let to = from.checked_add_signed(self.duration).ok_or_else(|| {
            ExportError::Checkpoint(format!("window starting at {} overflows", from))
        })?;
        Ok(TimeWindow { from, to })
    }
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_cold_start_starts_now() {
        let planner = WindowPlanner::default();
        let window = planner.next_window(None, at(9, 17)).unwrap();

        assert_eq!(window.from, at(9, 17));
        assert_eq!(window.to, at(10, 17));
    }

    #[test]
    fn test_continues_from_previous_end_regardless_of_clock() {
        let planner = WindowPlanner::default();
        let previous = Checkpoint::new(at(10, 0), at(10, 0), at(11, 0), chrono_tz::Tz::UTC);

        for now in [at(9, 0), at(11, 30), at(23, 59)] {
            let window = planner.next_window(Some(&previous), now).unwrap();
            assert_eq!(window.from, at(11, 0));
            assert_eq!(window.to, at(12, 0));
        }
    }

    #[test]
    fn test_custom_duration() {
        let planner = WindowPlanner::new(Duration::minutes(15));
        let window = planner.next_window(None, at(8, 0)).unwrap();
        assert_eq!(window.to - window.from, Duration::minutes(15));
    }

    #[test]
    fn test_non_positive_duration_falls_back() {
        let planner = WindowPlanner::new(Duration::zero());
        let window = planner.next_window(None, at(8, 0)).unwrap();
        assert_eq!(window.to, at(9, 0));
    }

    #[test]
    fn test_unrepresentable_window_end_is_an_error() {
        let planner = WindowPlanner::new(Duration::days(1));
        let previous = Checkpoint {
            partition: "2024-05-01".to_string(),
            created_at: at(10, 0),
            window_start: at(9, 0),
            window_end: DateTime::<Utc>::MAX_UTC - Duration::hours(1),
        };
        assert!(planner.next_window(Some(&previous), at(10, 0)).is_err());
    }

    #[test]
    fn test_window_is_half_open() {
        let window = TimeWindow::new(at(10, 0), at(11, 0)).unwrap();
        assert_eq!(window.to - window.from, Duration::hours(1));
        assert!(TimeWindow::new(at(11, 0), at(11, 0)).is_none());
    }

    #[test]
    fn test_display() {
        let window = TimeWindow::new(at(10, 0), at(11, 0)).unwrap();
        assert_eq!(
            window.to_string(),
            "[2024-05-01T10:00:00Z, 2024-05-01T11:00:00Z)"
        );
    }
}
