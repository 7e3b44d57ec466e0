//! FFmpeg process supervisor.

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

use super::config::EncoderConfig;
use super::error::EncoderError;
use super::progress;
use super::traits::JobRunner;
use super::types::{RunHandle, RunOutcome, RunRequest, RunnerEvent};
use crate::job::{ErrorCode, JobError, ProgressSnapshot};

/// Number of non-progress stderr lines kept for failure reports.
const DIAGNOSTIC_LINES: usize = 20;

/// How long to keep reading stderr after the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs each job as an ffmpeg child process.
pub struct FfmpegSupervisor {
    config: EncoderConfig,
}

impl FfmpegSupervisor {
    /// Creates a new supervisor with the given configuration.
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Creates a supervisor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

#[async_trait]
impl JobRunner for FfmpegSupervisor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn start(&self, request: RunRequest, events: mpsc::UnboundedSender<RunnerEvent>) -> RunHandle {
        let (handle, terminate_rx) = RunHandle::new(request.job_id.clone());
        let config = self.config.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let job_id = request.job_id.clone();

            let outcome = AssertUnwindSafe(supervise(&config, &request, &events, terminate_rx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!("Supervisor for job {} panicked", job_id);
                    RunOutcome::Failed {
                        error: JobError::new(ErrorCode::Io, "encoder supervisor panicked"),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                });

            if events.send(RunnerEvent::Exited { job_id, outcome }).is_err() {
                debug!("Orchestrator gone before exit of job {}", request.job_id);
            }
        });

        handle
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| EncoderError::from_spawn(&self.config.ffmpeg_path, e))?;

        if !output.status.success() {
            return Err(EncoderError::SpawnFailed {
                program: self.config.ffmpeg_path.display().to_string(),
                reason: format!("-version exited with {:?}", output.status.code()),
            });
        }

        Ok(())
    }
}

/// Spawns the encoder and follows it until exit.
async fn supervise(
    config: &EncoderConfig,
    request: &RunRequest,
    events: &mpsc::UnboundedSender<RunnerEvent>,
    mut terminate_rx: oneshot::Receiver<()>,
) -> RunOutcome {
    let started = Instant::now();
    let job_id = &request.job_id;

    let mut child = match Command::new(&config.ffmpeg_path)
        .args(config.leading_args())
        .args(&request.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let err = EncoderError::from_spawn(&config.ffmpeg_path, e);
            warn!("Failed to start encoder for job {}: {}", job_id, err);
            return RunOutcome::Failed {
                error: err.into_job_error(),
                elapsed_ms: 0,
            };
        }
    };

    info!("Encoder started for job {} (pid {:?})", job_id, child.id());

    let Some(mut stderr) = child.stderr.take() else {
        let _ = child.start_kill();
        return RunOutcome::Failed {
            error: JobError::new(ErrorCode::Io, "encoder stderr was not captured"),
            elapsed_ms: 0,
        };
    };
    let mut stdin = child.stdin.take();

    let mut stream = StderrStream::new(request.initial_progress.clone());
    let mut buf = vec![0u8; 8192];
    let mut stderr_open = true;
    let mut terminate_armed = true;
    let mut kill_at: Option<Instant> = None;
    let deadline = config.max_runtime().map(|limit| started + limit);
    let mut timed_out = false;

    let status = loop {
        tokio::select! {
            read = stderr.read(&mut buf), if stderr_open => match read {
                Ok(0) => {
                    stderr_open = false;
                    if let Some(snapshot) = stream.finish() {
                        send_progress(events, request, snapshot);
                    }
                }
                Ok(n) => {
                    if let Some(snapshot) = stream.push(&buf[..n]) {
                        send_progress(events, request, snapshot);
                    }
                }
                Err(e) => {
                    warn!("Error reading encoder output for job {}: {}", job_id, e);
                    stderr_open = false;
                }
            },
            status = child.wait() => break status,
            res = &mut terminate_rx, if terminate_armed => {
                terminate_armed = false;
                if res.is_ok() {
                    info!("Terminating encoder for job {}", job_id);
                    request_quit(&mut stdin).await;
                    kill_at = Some(Instant::now() + config.termination_timeout());
                }
            }
            _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                kill_at = None;
                warn!("Encoder for job {} ignored quit request, killing", job_id);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill encoder for job {}: {}", job_id, e);
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && !timed_out => {
                timed_out = true;
                warn!("Encoder for job {} exceeded runtime limit, killing", job_id);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill encoder for job {}: {}", job_id, e);
                }
            }
        }
    };

    if stderr_open {
        drain(&mut stderr, &mut stream, events, request).await;
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let outcome = classify_exit(
        status,
        timed_out,
        config,
        stream.diagnostics(),
        &request.output_path,
        elapsed_ms,
    )
    .await;

    match &outcome {
        RunOutcome::Succeeded { .. } => info!("Encoder finished job {} in {} ms", job_id, elapsed_ms),
        RunOutcome::Failed { error, .. } => {
            warn!("Encoder failed job {}: {}", job_id, error.message)
        }
    }

    outcome
}

/// Reads whatever the process left in the pipe after it exited.
async fn drain(
    stderr: &mut ChildStderr,
    stream: &mut StderrStream,
    events: &mpsc::UnboundedSender<RunnerEvent>,
    request: &RunRequest,
) {
    let mut rest = Vec::new();
    // Grandchildren may hold the pipe open; take what is there and move on
    let _ = timeout(DRAIN_TIMEOUT, stderr.read_to_end(&mut rest)).await;
    if !rest.is_empty() {
        if let Some(snapshot) = stream.push(&rest) {
            send_progress(events, request, snapshot);
        }
    }
    if let Some(snapshot) = stream.finish() {
        send_progress(events, request, snapshot);
    }
}

async fn classify_exit(
    status: std::io::Result<ExitStatus>,
    timed_out: bool,
    config: &EncoderConfig,
    diagnostics: Option<String>,
    output_path: &std::path::Path,
    elapsed_ms: u64,
) -> RunOutcome {
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            return RunOutcome::Failed {
                error: JobError::new(ErrorCode::Io, format!("failed to wait for encoder: {}", e)),
                elapsed_ms,
            }
        }
    };

    if timed_out {
        let limit = config.max_runtime_secs.unwrap_or_default();
        return RunOutcome::Failed {
            error: JobError::new(
                ErrorCode::TimedOut,
                format!("Conversion timed out after {} seconds", limit),
            )
            .with_detail(diagnostics),
            elapsed_ms,
        };
    }

    if status.success() {
        return match tokio::fs::metadata(output_path).await {
            Ok(meta) => RunOutcome::Succeeded {
                output_size_bytes: meta.len(),
                elapsed_ms,
            },
            Err(_) => RunOutcome::Failed {
                error: JobError::new(
                    ErrorCode::OutputMissing,
                    format!("Output file not created: {}", output_path.display()),
                )
                .with_detail(diagnostics),
                elapsed_ms,
            },
        };
    }

    let error = match status.code() {
        Some(code) => JobError::new(
            ErrorCode::ExitedNonZero,
            format!("FFmpeg exited with code: {}", code),
        )
        .with_exit_code(code),
        None => JobError::new(ErrorCode::Terminated, "FFmpeg was terminated by a signal"),
    };

    RunOutcome::Failed {
        error: error.with_detail(diagnostics),
        elapsed_ms,
    }
}

/// Asks ffmpeg to stop cleanly by sending `q` on its stdin.
async fn request_quit(stdin: &mut Option<ChildStdin>) {
    if let Some(mut pipe) = stdin.take() {
        if let Err(e) = pipe.write_all(b"q\n").await {
            debug!("Could not write quit command to encoder: {}", e);
        }
    }
}

fn send_progress(
    events: &mpsc::UnboundedSender<RunnerEvent>,
    request: &RunRequest,
    progress: ProgressSnapshot,
) {
    let _ = events.send(RunnerEvent::Progress {
        job_id: request.job_id.clone(),
        progress,
    });
}

/// Splits raw stderr bytes into complete lines, feeds them to the progress
/// parser and remembers the last diagnostic lines.
struct StderrStream {
    pending: Vec<u8>,
    snapshot: ProgressSnapshot,
    tail: VecDeque<String>,
}

impl StderrStream {
    fn new(initial: ProgressSnapshot) -> Self {
        Self {
            pending: Vec::new(),
            snapshot: initial,
            tail: VecDeque::with_capacity(DIAGNOSTIC_LINES),
        }
    }

    /// Adds a chunk; returns a snapshot if complete lines carried progress.
    fn push(&mut self, bytes: &[u8]) -> Option<ProgressSnapshot> {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.iter().rposition(|b| *b == b'\n' || *b == b'\r')?;
        let complete: Vec<u8> = self.pending.drain(..=split).collect();
        self.consume(&String::from_utf8_lossy(&complete))
    }

    /// Flushes a trailing line with no terminator.
    fn finish(&mut self) -> Option<ProgressSnapshot> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        self.consume(&String::from_utf8_lossy(&rest))
    }

    fn consume(&mut self, text: &str) -> Option<ProgressSnapshot> {
        // Stats lines are separated by carriage returns
        let text = text.replace('\r', "\n");
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !progress::is_progress_line(line) {
                if self.tail.len() == DIAGNOSTIC_LINES {
                    self.tail.pop_front();
                }
                self.tail.push_back(line.to_string());
            }
        }

        let next = progress::feed(&text, &self.snapshot)?;
        self.snapshot = next.clone();
        Some(next)
    }

    fn diagnostics(&self) -> Option<String> {
        if self.tail.is_empty() {
            None
        } else {
            Some(self.tail.iter().cloned().collect::<Vec<_>>().join("\n"))
        }
    }
}
