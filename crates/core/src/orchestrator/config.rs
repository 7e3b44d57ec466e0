//! Queue configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest accepted concurrency limit.
pub const MIN_CONCURRENT: usize = 1;
/// Highest accepted concurrency limit.
pub const MAX_CONCURRENT: usize = 8;

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of encoder processes running at once.
    /// Clamped to 1..=8 when applied.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Start with admission paused; jobs queue up until resumed.
    #[serde(default)]
    pub start_paused: bool,

    /// Age after which completed and failed records are swept.
    /// Unset disables the periodic sweep.
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// How often the periodic sweep runs (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_sweep_interval() -> u64 {
    3600 // 1 hour
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            start_paused: false,
            retention_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    pub fn with_retention(mut self, secs: u64) -> Self {
        self.retention_secs = Some(secs);
        self
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Clamps a requested concurrency limit into the accepted range.
pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(MIN_CONCURRENT, MAX_CONCURRENT)
}
