//! Types exchanged between the orchestrator and encoder runners.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::job::{JobError, JobId, ProgressSnapshot};

/// Media information returned by an inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// File path.
    pub path: PathBuf,
    /// Duration in seconds.
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f32>,
    /// Overall bitrate in kbps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

/// Everything a runner needs to execute one job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub job_id: JobId,
    /// Encoder arguments from the argument builder.
    pub args: Vec<String>,
    pub output_path: PathBuf,
    /// Seed snapshot for progress accumulation.
    pub initial_progress: ProgressSnapshot,
}

/// How an encoder run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded {
        output_size_bytes: u64,
        elapsed_ms: u64,
    },
    Failed {
        error: JobError,
        elapsed_ms: u64,
    },
}

/// Message pushed from a runner to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Progress {
        job_id: JobId,
        progress: ProgressSnapshot,
    },
    /// Always the last event for a run.
    Exited { job_id: JobId, outcome: RunOutcome },
}

impl RunnerEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Progress { job_id, .. } | Self::Exited { job_id, .. } => job_id,
        }
    }
}

/// Control handle for one live run.
#[derive(Debug)]
pub struct RunHandle {
    job_id: JobId,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl RunHandle {
    /// Creates a handle and the receiver the runner watches for termination.
    pub fn new(job_id: JobId) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                job_id,
                terminate_tx: Some(tx),
            },
            rx,
        )
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Asks the runner to stop the process. Returns false if termination was
    /// already requested or the runner has gone away.
    pub fn terminate(&mut self) -> bool {
        match self.terminate_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Whether `terminate` has been called.
    pub fn is_terminating(&self) -> bool {
        self.terminate_tx.is_none()
    }
}
