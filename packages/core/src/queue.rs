//! Queue configuration and statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs holding an agent at once (running or paused).
    pub concurrency: u32,
    /// Period of the housekeeping tick that schedules and expires jobs.
    pub schedule_interval_ms: u64,
    /// How often a running job's engine run is polled.
    pub poll_interval_ms: u64,
    /// Minimum gap between two `progress_updated` events for the same job.
    pub progress_interval_ms: u64,
    /// Timeout for jobs whose configuration does not set one (seconds).
    pub default_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            schedule_interval_ms: 250,
            poll_interval_ms: 100,
            progress_interval_ms: 500,
            default_timeout_secs: 3600,
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Statistics for a queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub queued: u64,
    pub running: u64,
    pub paused: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Average duration of completed jobs in milliseconds.
    pub avg_duration_ms: Option<f64>,
}

impl QueueStats {
    /// Jobs holding a concurrency slot.
    pub fn active(&self) -> u64 {
        self.running + self.paused
    }

    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    /// Success rate as a percentage of completed plus failed jobs.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.completed + self.failed;
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}
