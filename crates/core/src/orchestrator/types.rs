//! Types for the job orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::job::{ConversionSettings, JobId, JobStatus};

/// Errors returned by orchestrator operations.
///
/// Encoder failures are not errors here; they are recorded on the job.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Input file does not exist.
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Output directory could not be created.
    #[error("failed to create output directory {path}: {reason}")]
    OutputDirectoryFailed { path: PathBuf, reason: String },

    /// Output file exists and overwrite was not requested.
    #[error("output file already exists: {0}")]
    DestinationExists(PathBuf),

    /// Settings or paths are inconsistent.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Job is already in a terminal status.
    #[error("job {id} cannot be cancelled in status {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    #[error("job {id} cannot be retried: {reason}")]
    NotRetryable { id: JobId, reason: String },

    /// The scheduler task has shut down.
    #[error("orchestrator is stopped")]
    Stopped,
}

/// Request to queue a new conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub settings: ConversionSettings,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Source duration, if already known. Needed for percentages.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl SubmitRequest {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            settings: ConversionSettings::default(),
            priority: 0,
            duration_secs: None,
        }
    }

    pub fn with_settings(mut self, settings: ConversionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Snapshot of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the scheduler task is accepting commands.
    pub running: bool,
    /// Admission paused; running jobs continue.
    pub paused: bool,
    pub max_concurrent: usize,
    pub pending_count: usize,
    pub queued_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
}

impl OrchestratorStatus {
    pub fn total(&self) -> usize {
        self.pending_count
            + self.queued_count
            + self.processing_count
            + self.completed_count
            + self.failed_count
            + self.cancelled_count
    }
}
