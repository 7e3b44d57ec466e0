//! Scheduler task.
//!
//! The scheduler is the single owner of the job table, the wait list and the
//! live run handles. Orchestrator handles send it [`Command`]s; encoder
//! runners send it [`RunnerEvent`]s. Every state change and every published
//! event happens here, one message at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::encoder::{build_args, JobRunner, RunHandle, RunOutcome, RunRequest, RunnerEvent};
use crate::events::{EventBus, JobEvent};
use crate::job::{Job, JobId, JobResult, JobStatus};
use crate::metrics;

use super::config::{clamp_concurrency, QueueConfig};
use super::queue::WaitList;
use super::types::{JobFilter, OrchestratorError, OrchestratorStatus};

pub(crate) enum Command {
    Submit {
        job: Job,
        reply: oneshot::Sender<Result<JobId, OrchestratorError>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<Result<Job, OrchestratorError>>,
    },
    Retry {
        id: JobId,
        reply: oneshot::Sender<Result<JobId, OrchestratorError>>,
    },
    Get {
        id: JobId,
        reply: oneshot::Sender<Option<Job>>,
    },
    List {
        filter: JobFilter,
        reply: oneshot::Sender<Vec<Job>>,
    },
    SetLimit {
        limit: usize,
        reply: oneshot::Sender<usize>,
    },
    Sweep {
        older_than: Duration,
        reply: oneshot::Sender<usize>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<OrchestratorStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct Record {
    /// Insertion order, used for newest-first listing.
    seq: u64,
    job: Job,
}

struct ActiveRun {
    handle: RunHandle,
    cancel_requested: bool,
}

pub(crate) struct Scheduler {
    runner: Arc<dyn JobRunner>,
    bus: EventBus,
    records: HashMap<JobId, Record>,
    waiting: WaitList,
    active: HashMap<JobId, ActiveRun>,
    limit: usize,
    paused: bool,
    next_seq: u64,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: mpsc::UnboundedReceiver<RunnerEvent>,
}

impl Scheduler {
    pub(crate) fn new(
        config: &QueueConfig,
        runner: Arc<dyn JobRunner>,
        bus: EventBus,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let limit = clamp_concurrency(config.max_concurrent);
        if limit != config.max_concurrent {
            warn!(
                "max_concurrent {} out of range, using {}",
                config.max_concurrent, limit
            );
        }

        Self {
            runner,
            bus,
            records: HashMap::new(),
            waiting: WaitList::new(),
            active: HashMap::new(),
            limit,
            paused: config.start_paused,
            next_seq: 0,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
            commands,
            events_tx,
            events_rx,
        }
    }

    /// Processes messages until shutdown completes.
    pub(crate) async fn run(mut self) {
        info!(
            "Job scheduler started (runner: {}, max_concurrent: {}, paused: {})",
            self.runner.name(),
            self.limit,
            self.paused
        );
        metrics::CONCURRENCY_LIMIT.set(self.limit as i64);

        let mut commands_open = true;
        loop {
            // Runner events first: an exit already reported must settle the
            // job before a later command can observe it as running.
            tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => self.handle_runner_event(event),
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All orchestrator handles dropped");
                        commands_open = false;
                        self.begin_shutdown(None);
                    }
                },
            }

            if self.shutting_down && self.active.is_empty() {
                break;
            }
        }

        self.refresh_gauges();
        self.bus.clear();
        info!("Job scheduler stopped");

        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { job, reply } => {
                let _ = reply.send(self.submit(job, "submit"));
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(&id));
            }
            Command::Retry { id, reply } => {
                let _ = reply.send(self.retry(&id));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.records.get(&id).map(|r| r.job.clone()));
            }
            Command::List { filter, reply } => {
                let _ = reply.send(self.list(&filter));
            }
            Command::SetLimit { limit, reply } => {
                let _ = reply.send(self.set_limit(limit));
            }
            Command::Sweep { older_than, reply } => {
                let _ = reply.send(self.sweep(older_than));
            }
            Command::Pause { reply } => {
                if !self.paused {
                    info!("Job admission paused");
                    self.paused = true;
                }
                let _ = reply.send(());
            }
            Command::Resume { reply } => {
                if self.paused {
                    info!("Job admission resumed");
                    self.paused = false;
                    self.schedule();
                    self.publish_queue();
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => self.begin_shutdown(Some(reply)),
        }
    }

    fn submit(&mut self, mut job: Job, origin: &str) -> Result<JobId, OrchestratorError> {
        if self.shutting_down {
            return Err(OrchestratorError::Stopped);
        }

        let id = job.id.clone();
        if let Err(e) = job.transition_to(JobStatus::Queued, None) {
            error!("Cannot queue job {}: {}", id, e);
            return Err(OrchestratorError::InvalidSettings(e.to_string()));
        }

        info!(
            "Job {} queued (priority {}): {} -> {}",
            id,
            job.priority,
            job.input_path.display(),
            job.output_path.display()
        );
        metrics::JOBS_SUBMITTED.with_label_values(&[origin]).inc();

        self.waiting.push(id.clone(), job.priority);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(id.clone(), Record { seq, job });

        self.schedule();
        self.publish_queue();
        Ok(id)
    }

    fn cancel(&mut self, id: &JobId) -> Result<Job, OrchestratorError> {
        let status = self
            .records
            .get(id)
            .map(|r| r.job.status)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))?;

        if status.is_terminal() {
            return Err(OrchestratorError::NotCancellable {
                id: id.clone(),
                status,
            });
        }

        if status == JobStatus::Processing {
            if let Some(run) = self.active.get_mut(id) {
                if !run.cancel_requested {
                    if run.handle.terminate() {
                        info!("Cancelling running job {}", id);
                        run.cancel_requested = true;
                    } else {
                        debug!("Runner for job {} already finishing", id);
                    }
                }
            }
            return self
                .records
                .get(id)
                .map(|r| r.job.clone())
                .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()));
        }

        self.waiting.remove(id);
        let job = self.finish(id, JobStatus::Cancelled, None);
        self.schedule();
        self.publish_queue();
        job.ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))
    }

    fn retry(&mut self, id: &JobId) -> Result<JobId, OrchestratorError> {
        if self.shutting_down {
            return Err(OrchestratorError::Stopped);
        }

        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))?;
        let previous = &mut record.job;

        let reason = if previous.status != JobStatus::Failed {
            Some(format!("job is {}", previous.status))
        } else if !previous.retryable {
            Some("failure is not retryable".to_string())
        } else if previous.retry_count >= previous.max_retries {
            Some(format!("retry limit of {} reached", previous.max_retries))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(OrchestratorError::NotRetryable {
                id: id.clone(),
                reason,
            });
        }

        let mut job = Job::new(
            previous.input_path.clone(),
            previous.output_path.clone(),
            previous.settings.clone(),
            previous.priority,
        );
        job.duration_secs = previous.duration_secs;
        job.retry_count = previous.retry_count + 1;
        job.max_retries = previous.max_retries;

        // The failed record stays for history but cannot be retried twice
        previous.retryable = false;

        info!(
            "Retrying job {} as {} (attempt {}/{})",
            id, job.id, job.retry_count, job.max_retries
        );
        self.submit(job, "retry")
    }

    fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let mut records: Vec<&Record> = self
            .records
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.job.status == s))
            .collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq));

        let limit = filter.limit.unwrap_or(usize::MAX);
        records.into_iter().take(limit).map(|r| r.job.clone()).collect()
    }

    fn set_limit(&mut self, requested: usize) -> usize {
        let limit = clamp_concurrency(requested);
        if limit != self.limit {
            info!("Concurrency limit changed: {} -> {}", self.limit, limit);
            self.limit = limit;
            metrics::CONCURRENCY_LIMIT.set(limit as i64);
            // Lowering the limit never stops running jobs
            self.schedule();
            self.publish_queue();
        }
        limit
    }

    fn sweep(&mut self, older_than: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let before = self.records.len();
        self.records.retain(|_, r| {
            let sweepable = matches!(r.job.status, JobStatus::Completed | JobStatus::Failed);
            !(sweepable && r.job.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - self.records.len();

        if removed > 0 {
            info!("Swept {} finished job records", removed);
            metrics::JOBS_SWEPT.inc_by(removed as u64);
            self.publish_queue();
        }
        removed
    }

    fn status(&self) -> OrchestratorStatus {
        let mut status = OrchestratorStatus {
            running: !self.shutting_down,
            paused: self.paused,
            max_concurrent: self.limit,
            ..Default::default()
        };
        for record in self.records.values() {
            match record.job.status {
                JobStatus::Pending => status.pending_count += 1,
                JobStatus::Queued => status.queued_count += 1,
                JobStatus::Processing => status.processing_count += 1,
                JobStatus::Completed => status.completed_count += 1,
                JobStatus::Failed => status.failed_count += 1,
                JobStatus::Cancelled => status.cancelled_count += 1,
            }
        }
        status
    }

    fn begin_shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
        if let Some(reply) = reply {
            self.shutdown_waiters.push(reply);
        }
        if self.shutting_down {
            return;
        }

        info!(
            "Job scheduler shutting down ({} queued, {} running)",
            self.waiting.len(),
            self.active.len()
        );
        self.shutting_down = true;

        for id in self.waiting.drain() {
            self.finish(&id, JobStatus::Cancelled, None);
        }
        for (id, run) in self.active.iter_mut() {
            if run.handle.terminate() {
                run.cancel_requested = true;
            } else if !run.cancel_requested {
                debug!("Runner for job {} already finishing", id);
            }
        }
        self.publish_queue();
    }

    /// Admits queued jobs while slots are free.
    fn schedule(&mut self) {
        while !self.paused && !self.shutting_down && self.active.len() < self.limit {
            let Some(id) = self.waiting.pop() else {
                break;
            };
            self.start(&id);
        }
    }

    fn start(&mut self, id: &JobId) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if let Err(e) = record.job.transition_to(JobStatus::Processing, None) {
            warn!("Skipping job {}: {}", id, e);
            return;
        }
        let job = record.job.clone();

        let request = RunRequest {
            job_id: id.clone(),
            args: build_args(&job),
            output_path: job.output_path.clone(),
            initial_progress: job.progress.clone().unwrap_or_default(),
        };
        debug!("Starting job {} with args {:?}", id, request.args);

        let handle = self.runner.start(request, self.events_tx.clone());
        self.active.insert(
            id.clone(),
            ActiveRun {
                handle,
                cancel_requested: false,
            },
        );

        info!("Job {} started ({}/{} slots)", id, self.active.len(), self.limit);
        self.bus.publish(&JobEvent::JobStarted { job });
    }

    fn handle_runner_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Progress { job_id, progress } => {
                if !self.active.contains_key(&job_id) {
                    debug!("Ignoring progress for inactive job {}", job_id);
                    return;
                }
                let Some(record) = self.records.get_mut(&job_id) else {
                    return;
                };
                record.job.progress = Some(progress.clone());
                self.bus.publish(&JobEvent::JobProgress { job_id, progress });
            }
            RunnerEvent::Exited { job_id, outcome } => {
                let Some(run) = self.active.remove(&job_id) else {
                    debug!("Ignoring exit for inactive job {}", job_id);
                    return;
                };

                let (status, result) = if run.cancel_requested {
                    let elapsed_ms = match &outcome {
                        RunOutcome::Succeeded { elapsed_ms, .. }
                        | RunOutcome::Failed { elapsed_ms, .. } => *elapsed_ms,
                    };
                    (
                        JobStatus::Cancelled,
                        JobResult {
                            success: false,
                            output_size_bytes: None,
                            conversion_time_ms: elapsed_ms,
                            error: None,
                        },
                    )
                } else {
                    match outcome {
                        RunOutcome::Succeeded {
                            output_size_bytes,
                            elapsed_ms,
                        } => (
                            JobStatus::Completed,
                            JobResult {
                                success: true,
                                output_size_bytes: Some(output_size_bytes),
                                conversion_time_ms: elapsed_ms,
                                error: None,
                            },
                        ),
                        RunOutcome::Failed { error, elapsed_ms } => (
                            JobStatus::Failed,
                            JobResult {
                                success: false,
                                output_size_bytes: None,
                                conversion_time_ms: elapsed_ms,
                                error: Some(error),
                            },
                        ),
                    }
                };

                self.finish(&job_id, status, Some(result));
                self.schedule();
                self.publish_queue();
            }
        }
    }

    /// Moves a job to a terminal status and announces it.
    fn finish(&mut self, id: &JobId, status: JobStatus, result: Option<JobResult>) -> Option<Job> {
        let record = self.records.get_mut(id)?;
        if let Err(e) = record.job.transition_to(status, result) {
            error!("Job {} could not finish: {}", id, e);
            return None;
        }
        let job = record.job.clone();

        metrics::JOBS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
        if let Some(result) = &job.result {
            if job.started_at.is_some() {
                metrics::CONVERSION_DURATION
                    .with_label_values(&[status.as_str()])
                    .observe(result.conversion_time_ms as f64 / 1000.0);
            }
            if let Some(bytes) = result.output_size_bytes {
                metrics::OUTPUT_BYTES.inc_by(bytes);
            }
        }

        match status {
            JobStatus::Completed => {
                info!("Job {} completed", id);
                self.bus.publish(&JobEvent::JobCompleted { job: job.clone() });
            }
            JobStatus::Failed => {
                let error = job.result.as_ref().and_then(|r| r.error.clone());
                match error {
                    Some(error) => {
                        warn!("Job {} failed: {}", id, error.message);
                        metrics::JOB_FAILURES
                            .with_label_values(&[error.code.as_str()])
                            .inc();
                        self.bus.publish(&JobEvent::JobFailed {
                            job: job.clone(),
                            error,
                        });
                    }
                    None => error!("Job {} failed without an error record", id),
                }
            }
            JobStatus::Cancelled => {
                info!("Job {} cancelled", id);
                self.bus.publish(&JobEvent::JobCancelled { job: job.clone() });
            }
            _ => {}
        }

        Some(job)
    }

    fn publish_queue(&self) {
        self.refresh_gauges();
        let jobs = self.list(&JobFilter::default());
        self.bus.publish(&JobEvent::QueueUpdated { jobs });
    }

    fn refresh_gauges(&self) {
        metrics::JOBS_QUEUED.set(self.waiting.len() as i64);
        metrics::JOBS_PROCESSING.set(self.active.len() as i64);
    }
}
