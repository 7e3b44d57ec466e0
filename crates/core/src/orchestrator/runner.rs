//! Orchestrator handle.
//!
//! [`Orchestrator`] is cheap to clone and safe to share across tasks. It
//! checks submissions against the filesystem on the caller's task, then hands
//! work to the scheduler task, which owns all job state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::encoder::JobRunner;
use crate::events::EventBus;
use crate::job::{Job, JobId};
use crate::metrics;

use super::config::QueueConfig;
use super::scheduler::{Command, Scheduler};
use super::types::{JobFilter, OrchestratorError, OrchestratorStatus, SubmitRequest};

const COMMAND_BUFFER: usize = 256;

/// Bounded-concurrency queue of conversion jobs.
#[derive(Clone)]
pub struct Orchestrator {
    tx: mpsc::Sender<Command>,
    bus: EventBus,
}

impl Orchestrator {
    /// Creates the orchestrator and spawns its scheduler task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: QueueConfig, runner: Arc<dyn JobRunner>, bus: EventBus) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let scheduler = Scheduler::new(&config, runner, bus.clone(), rx);
        tokio::spawn(scheduler.run());

        Self { tx, bus }
    }

    /// The bus this orchestrator publishes on.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Validates and queues a conversion.
    ///
    /// Validation failures are returned here and leave no job record.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId, OrchestratorError> {
        if let Err(e) = validate_submission(&request).await {
            warn!("Rejected submission for {}: {}", request.input_path.display(), e);
            metrics::JOBS_REJECTED
                .with_label_values(&[rejection_reason(&e)])
                .inc();
            return Err(e);
        }

        let mut job = Job::new(
            request.input_path,
            request.output_path,
            request.settings,
            request.priority,
        );
        job.duration_secs = request.duration_secs;

        self.call(|reply| Command::Submit { job, reply }).await?
    }

    /// Cancels a job.
    ///
    /// Waiting jobs are cancelled at once. A running job is asked to stop and
    /// becomes `cancelled` when its process exits; the returned snapshot is
    /// still `processing` in that case.
    pub async fn cancel(&self, id: &JobId) -> Result<Job, OrchestratorError> {
        let id = id.clone();
        self.call(|reply| Command::Cancel { id, reply }).await?
    }

    /// Queues a fresh attempt of a failed, retryable job.
    pub async fn retry(&self, id: &JobId) -> Result<JobId, OrchestratorError> {
        let previous = self.get_job(id).await?;
        if !path_exists(&previous.input_path).await {
            return Err(OrchestratorError::InputNotFound(previous.input_path));
        }

        let id = id.clone();
        self.call(|reply| Command::Retry { id, reply }).await?
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, OrchestratorError> {
        let lookup = id.clone();
        self.call(|reply| Command::Get { id: lookup, reply })
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))
    }

    /// Lists jobs, newest first.
    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, OrchestratorError> {
        self.call(|reply| Command::List { filter, reply }).await
    }

    /// Sets the concurrency limit and returns the value applied after
    /// clamping. Running jobs are never stopped to honour a lower limit.
    pub async fn set_concurrency_limit(&self, limit: usize) -> Result<usize, OrchestratorError> {
        self.call(|reply| Command::SetLimit { limit, reply }).await
    }

    /// Removes completed and failed records that finished more than `age`
    /// ago. Returns the number removed.
    pub async fn clear_older_than(&self, age: Duration) -> Result<usize, OrchestratorError> {
        self.call(|reply| Command::Sweep {
            older_than: age,
            reply,
        })
        .await
    }

    /// Stops admitting queued jobs. Running jobs continue.
    pub async fn pause(&self) -> Result<(), OrchestratorError> {
        self.call(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        self.call(|reply| Command::Resume { reply }).await
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        self.call(|reply| Command::Status { reply })
            .await
            .unwrap_or_default()
    }

    /// Cancels queued jobs, terminates running ones and waits for them to
    /// exit. Event subscriptions are released once everything has stopped.
    pub async fn shutdown(&self) {
        info!("Stopping job orchestrator");
        if self.call(|reply| Command::Shutdown { reply }).await.is_err() {
            info!("Job orchestrator already stopped");
        }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| OrchestratorError::Stopped)?;
        rx.await.map_err(|_| OrchestratorError::Stopped)
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Checks paths and settings before a job record exists.
async fn validate_submission(request: &SubmitRequest) -> Result<(), OrchestratorError> {
    if request.input_path == request.output_path {
        return Err(OrchestratorError::InvalidSettings(
            "input and output paths are the same".to_string(),
        ));
    }
    if let Some(trim) = &request.settings.trim {
        trim.validate().map_err(OrchestratorError::InvalidSettings)?;
    }
    if let Some(duration) = request.duration_secs {
        if !duration.is_finite() || duration < 0.0 {
            return Err(OrchestratorError::InvalidSettings(format!(
                "invalid source duration: {}",
                duration
            )));
        }
    }

    if !path_exists(&request.input_path).await {
        return Err(OrchestratorError::InputNotFound(request.input_path.clone()));
    }

    if let Some(parent) = request
        .output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            OrchestratorError::OutputDirectoryFailed {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    }

    if !request.settings.allows_overwrite() && path_exists(&request.output_path).await {
        return Err(OrchestratorError::DestinationExists(
            request.output_path.clone(),
        ));
    }

    Ok(())
}

fn rejection_reason(err: &OrchestratorError) -> &'static str {
    match err {
        OrchestratorError::InputNotFound(_) => "input_not_found",
        OrchestratorError::OutputDirectoryFailed { .. } => "output_directory",
        OrchestratorError::DestinationExists(_) => "destination_exists",
        OrchestratorError::InvalidSettings(_) => "invalid_settings",
        _ => "other",
    }
}
