//! Jobs flowing from the detection loop to the consumer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A newly detected item waiting to be relayed.
///
/// Created by the detection loop, moved by value through the job queue and
/// owned by the consumer once dequeued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id, used to name per-job working areas and artifacts.
    pub id: String,
    /// Item id as reported by the source.
    pub item_id: String,
    pub title: String,
    /// Canonical locator passed to the resolver.
    pub locator: String,
    pub source_id: String,
    pub discovered_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        item_id: impl Into<String>,
        title: impl Into<String>,
        locator: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            item_id: item_id.into(),
            title: title.into(),
            locator: locator.into(),
            source_id: source_id.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// Pipeline stage a job passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Acquire,
    Normalize,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Acquire => "acquire",
            Stage::Normalize => "normalize",
            Stage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock duration of each stage of a completed job, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub resolve_ms: f64,
    pub acquire_ms: f64,
    pub normalize_ms: f64,
    pub publish_ms: f64,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        match stage {
            Stage::Resolve => self.resolve_ms = ms,
            Stage::Acquire => self.acquire_ms = ms,
            Stage::Normalize => self.normalize_ms = ms,
            Stage::Publish => self.publish_ms = ms,
        }
    }

    pub fn get(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Resolve => self.resolve_ms,
            Stage::Acquire => self.acquire_ms,
            Stage::Normalize => self.normalize_ms,
            Stage::Publish => self.publish_ms,
        }
    }
}

impl std::fmt::Display for StageTimings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "resolve {:.0}ms | acquire {:.0}ms | normalize {:.0}ms | publish {:.0}ms",
            self.resolve_ms, self.acquire_ms, self.normalize_ms, self.publish_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("vid", "t", "loc", "src");
        let b = Job::new("vid", "t", "loc", "src");
        assert_ne!(a.id, b.id);
        assert!(!a.id.contains('-'));
    }

    #[test]
    fn test_stage_timings_record() {
        let mut timings = StageTimings::default();
        timings.record(Stage::Acquire, Duration::from_millis(1500));
        assert_eq!(timings.get(Stage::Acquire), 1500.0);
        assert_eq!(timings.get(Stage::Publish), 0.0);
        assert!(timings.to_string().contains("acquire 1500ms"));
    }
}
