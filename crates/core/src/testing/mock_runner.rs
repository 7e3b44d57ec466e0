//! Mock job runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::encoder::{
    progress, EncoderError, JobRunner, RunHandle, RunOutcome, RunRequest, RunnerEvent,
};
use crate::job::{ErrorCode, JobError, JobId, ProgressSnapshot};

/// Bytes reported for a successful mock conversion.
pub const MOCK_OUTPUT_SIZE: u64 = 1024;

struct HeldRun {
    events: mpsc::UnboundedSender<RunnerEvent>,
    progress: ProgressSnapshot,
    started: Instant,
}

#[derive(Default)]
struct State {
    runs: HashMap<JobId, HeldRun>,
    requests: Vec<RunRequest>,
    max_running: usize,
    auto_complete: Option<Duration>,
}

/// Mock implementation of the JobRunner trait.
///
/// By default every started run is held until the test resolves it with
/// [`complete`](Self::complete), [`fail`](Self::fail) or a cancellation from
/// the orchestrator. No processes are spawned.
///
/// # Example
///
/// ```rust,ignore
/// use vidqueue_core::testing::MockRunner;
///
/// let runner = Arc::new(MockRunner::new());
/// let orchestrator = Orchestrator::new(config, runner.clone(), EventBus::new());
///
/// let id = orchestrator.submit(request).await?;
/// runner.emit_progress(&id, "out_time_us=4000000");
/// runner.complete(&id);
/// ```
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<State>>,
}

impl MockRunner {
    /// Create a mock runner that holds every run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock runner that completes each run after `delay`.
    pub fn auto_complete(delay: Duration) -> Self {
        let runner = Self::new();
        runner.lock().auto_complete = Some(delay);
        runner
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ids of started runs, in start order.
    pub fn started_jobs(&self) -> Vec<JobId> {
        self.lock().requests.iter().map(|r| r.job_id.clone()).collect()
    }

    /// Requests received, in start order.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.lock().requests.clone()
    }

    /// Number of runs not yet resolved.
    pub fn running_count(&self) -> usize {
        self.lock().runs.len()
    }

    /// Highest number of simultaneously held runs seen so far.
    pub fn max_running(&self) -> usize {
        self.lock().max_running
    }

    pub fn is_running(&self, id: &JobId) -> bool {
        self.lock().runs.contains_key(id)
    }

    /// Feeds `chunk` through the progress parser for a held run and
    /// reports the result. Returns the new snapshot, if any.
    pub fn emit_progress(&self, id: &JobId, chunk: &str) -> Option<ProgressSnapshot> {
        let mut state = self.lock();
        let run = state.runs.get_mut(id)?;
        let next = progress::feed(chunk, &run.progress)?;
        run.progress = next.clone();
        let _ = run.events.send(RunnerEvent::Progress {
            job_id: id.clone(),
            progress: next.clone(),
        });
        Some(next)
    }

    /// Resolves a held run successfully. Returns false if it was not held.
    pub fn complete(&self, id: &JobId) -> bool {
        self.resolve(id, |elapsed_ms| RunOutcome::Succeeded {
            output_size_bytes: MOCK_OUTPUT_SIZE,
            elapsed_ms,
        })
    }

    /// Resolves a held run with `error`.
    pub fn fail(&self, id: &JobId, error: JobError) -> bool {
        self.resolve(id, |elapsed_ms| RunOutcome::Failed { error, elapsed_ms })
    }

    /// Resolves a held run as a nonzero process exit.
    pub fn exit_with_code(&self, id: &JobId, code: i32) -> bool {
        self.fail(
            id,
            JobError::new(
                ErrorCode::ExitedNonZero,
                format!("FFmpeg exited with code: {}", code),
            )
            .with_exit_code(code),
        )
    }

    fn resolve(&self, id: &JobId, outcome: impl FnOnce(u64) -> RunOutcome) -> bool {
        let Some(run) = self.lock().runs.remove(id) else {
            return false;
        };
        let elapsed_ms = run.started.elapsed().as_millis() as u64;
        run.events
            .send(RunnerEvent::Exited {
                job_id: id.clone(),
                outcome: outcome(elapsed_ms),
            })
            .is_ok()
    }

    /// Waits until at least `n` runs have been started.
    pub async fn wait_for_started(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.requests.len() >= n).await
    }

    /// Waits until no run is held.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.runs.is_empty()).await
    }

    async fn wait_until(&self, timeout: Duration, check: impl Fn(&State) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check(&self.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl JobRunner for MockRunner {
    fn name(&self) -> &str {
        "mock"
    }

    fn start(&self, request: RunRequest, events: mpsc::UnboundedSender<RunnerEvent>) -> RunHandle {
        let job_id = request.job_id.clone();
        let (handle, terminate_rx) = RunHandle::new(job_id.clone());

        let auto_complete = {
            let mut state = self.lock();
            state.runs.insert(
                job_id.clone(),
                HeldRun {
                    events,
                    progress: request.initial_progress.clone(),
                    started: Instant::now(),
                },
            );
            state.requests.push(request);
            state.max_running = state.max_running.max(state.runs.len());
            state.auto_complete
        };

        // Termination resolves the run the way a killed process would
        let runner = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            if terminate_rx.await.is_ok() {
                runner.fail(
                    &id,
                    JobError::new(ErrorCode::Terminated, "FFmpeg was terminated by a signal"),
                );
            }
        });

        if let Some(delay) = auto_complete {
            let runner = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                runner.complete(&job_id);
            });
        }

        handle
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}
