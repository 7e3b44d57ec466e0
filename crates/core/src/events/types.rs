//! Event kinds and payloads published by the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{Job, JobError, JobId, ProgressSnapshot};

/// The closed set of event kinds a subscriber can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
    QueueUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::JobStarted,
        EventKind::JobProgress,
        EventKind::JobCompleted,
        EventKind::JobFailed,
        EventKind::JobCancelled,
        EventKind::QueueUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobStarted => "job_started",
            Self::JobProgress => "job_progress",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::JobCancelled => "job_cancelled",
            Self::QueueUpdated => "queue_updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobStarted {
        job: Job,
    },
    JobProgress {
        job_id: JobId,
        progress: ProgressSnapshot,
    },
    JobCompleted {
        job: Job,
    },
    JobFailed {
        job: Job,
        error: JobError,
    },
    JobCancelled {
        job: Job,
    },
    /// Full job list after any change to the queue.
    QueueUpdated {
        jobs: Vec<Job>,
    },
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::JobStarted { .. } => EventKind::JobStarted,
            Self::JobProgress { .. } => EventKind::JobProgress,
            Self::JobCompleted { .. } => EventKind::JobCompleted,
            Self::JobFailed { .. } => EventKind::JobFailed,
            Self::JobCancelled { .. } => EventKind::JobCancelled,
            Self::QueueUpdated { .. } => EventKind::QueueUpdated,
        }
    }

    /// The job this event is about, if it concerns a single job.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobStarted { job }
            | Self::JobCompleted { job }
            | Self::JobFailed { job, .. }
            | Self::JobCancelled { job } => Some(&job.id),
            Self::JobProgress { job_id, .. } => Some(job_id),
            Self::QueueUpdated { .. } => None,
        }
    }
}
