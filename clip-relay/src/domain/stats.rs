//! Per-tenant processing statistics.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of recent processing durations kept per tenant.
pub const DEFAULT_STATS_WINDOW: usize = 100;

/// Completion counters plus a sliding window of recent processing durations.
///
/// The moving average is recomputed whenever a sample is added, so readers
/// never pay for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Jobs that reached a confirmed publish.
    pub total_count: u64,
    /// Jobs that failed in any stage.
    pub failed_count: u64,
    /// Jobs completed since local midnight.
    pub completed_today: u64,
    /// Mean of the windowed samples, in seconds.
    pub average_duration_secs: f64,
    /// Recent total processing durations, in seconds (oldest first).
    pub samples: VecDeque<f64>,
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    window: usize,
    #[serde(skip)]
    today: Option<NaiveDate>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::with_window(DEFAULT_STATS_WINDOW)
    }
}

impl Stats {
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            total_count: 0,
            failed_count: 0,
            completed_today: 0,
            average_duration_secs: 0.0,
            samples: VecDeque::with_capacity(window),
            last_completed_at: None,
            window,
            today: None,
        }
    }

    /// Record a completed job that took `duration` end to end.
    pub fn record_completion(&mut self, duration: Duration) {
        self.record_completion_at(duration, Local::now());
    }

    /// Record a completion observed at `at` (local time drives the daily counter).
    pub fn record_completion_at(&mut self, duration: Duration, at: DateTime<Local>) {
        let date = at.date_naive();
        if self.today != Some(date) {
            self.today = Some(date);
            self.completed_today = 0;
        }

        self.total_count += 1;
        self.completed_today += 1;
        self.last_completed_at = Some(at.with_timezone(&Utc));
        self.push_sample(duration.as_secs_f64());
    }

    /// Record a failed job.
    pub fn record_failure(&mut self) {
        self.failed_count += 1;
    }

    fn push_sample(&mut self, secs: f64) {
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(secs);

        let sum: f64 = self.samples.iter().sum();
        self.average_duration_secs = sum / self.samples.len() as f64;
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_moving_average_over_window() {
        let mut stats = Stats::with_window(3);
        for secs in [10, 20, 30, 40] {
            stats.record_completion(Duration::from_secs(secs));
        }

        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.sample_count(), 3);
        assert_eq!(stats.samples.front().copied(), Some(20.0));
        assert!((stats.average_duration_secs - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completed_today_resets_on_new_day() {
        let mut stats = Stats::default();
        let day1 = Local.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        let day2 = Local.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap();

        stats.record_completion_at(Duration::from_secs(5), day1);
        stats.record_completion_at(Duration::from_secs(5), day1);
        assert_eq!(stats.completed_today, 2);

        stats.record_completion_at(Duration::from_secs(5), day2);
        assert_eq!(stats.completed_today, 1);
        assert_eq!(stats.total_count, 3);
    }

    #[test]
    fn test_failures_do_not_touch_samples() {
        let mut stats = Stats::default();
        stats.record_failure();
        stats.record_failure();
        assert_eq!(stats.failed_count, 2);
        assert_eq!(stats.sample_count(), 0);
        assert_eq!(stats.average_duration_secs, 0.0);
    }
}
