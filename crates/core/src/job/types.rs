//! Job record types and the job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use super::settings::ConversionSettings;

/// Default number of retries a caller may request for a failed job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet seen by the scheduler.
    Pending,
    /// Waiting in the admission queue.
    Queued,
    /// An encoder process is running for this job.
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns the status name used in filters and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Pending, Cancelled)
                | (Queued, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Point-in-time read of an in-flight conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// 0.0 - 100.0
    pub percentage: f64,
    /// Seconds of output encoded so far.
    pub current_time: f64,
    /// Expected output length in seconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    /// Encoding speed as a multiple of realtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
    pub stage: String,
}

impl ProgressSnapshot {
    /// Initial snapshot for a job that has just been handed to the encoder.
    pub fn starting(total_time: Option<f64>) -> Self {
        Self {
            percentage: 0.0,
            current_time: 0.0,
            total_time,
            speed: None,
            bitrate_kbps: None,
            frame: None,
            fps: None,
            eta_secs: None,
            stage: "starting".to_string(),
        }
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::starting(None)
    }
}

/// Failure category for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The encoder could not be launched (missing binary, permissions).
    SpawnFailed,
    /// The encoder exited with a nonzero code.
    ExitedNonZero,
    /// The encoder was killed by a signal.
    Terminated,
    /// The encoder exceeded the configured runtime limit.
    TimedOut,
    /// The encoder reported success but no output file exists.
    OutputMissing,
    /// I/O failure while supervising the encoder.
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnFailed => "spawn_failed",
            Self::ExitedNonZero => "exited_non_zero",
            Self::Terminated => "terminated",
            Self::TimedOut => "timed_out",
            Self::OutputMissing => "output_missing",
            Self::Io => "io",
        }
    }

    /// Whether re-running the same job could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SpawnFailed | Self::OutputMissing)
    }
}

/// Structured error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    /// Trailing diagnostic output from the encoder, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            exit_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail.filter(|d| !d.is_empty());
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

/// Outcome recorded when a job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,
    /// Wall-clock time spent processing, in milliseconds.
    pub conversion_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

/// Rejected status change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One conversion request and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub settings: ConversionSettings,
    pub status: JobStatus,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Source duration in seconds, when the caller inspected the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retryable: bool,
}

impl Job {
    /// Creates a pending job.
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        settings: ConversionSettings,
        priority: i32,
    ) -> Self {
        Self {
            id: JobId::new(),
            input_path,
            output_path,
            settings,
            status: JobStatus::Pending,
            priority,
            progress: None,
            result: None,
            duration_secs: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            retryable: true,
        }
    }

    /// Expected output length, accounting for the trim window.
    pub fn expected_output_secs(&self) -> Option<f64> {
        let trim = self.settings.trim.unwrap_or_default();
        match trim.duration() {
            Some(window) => Some(match self.duration_secs {
                Some(source) => window.min((source - trim.start()).max(0.0)),
                None => window,
            }),
            None => self
                .duration_secs
                .map(|source| (source - trim.start()).max(0.0)),
        }
    }

    /// Moves the job to `next`, keeping timestamps, progress and result
    /// consistent with the new status.
    ///
    /// `result` is required when entering a terminal status and ignored
    /// otherwise.
    pub fn transition_to(
        &mut self,
        next: JobStatus,
        result: Option<JobResult>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            JobStatus::Processing => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
                self.progress = Some(ProgressSnapshot::starting(self.expected_output_secs()));
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
                self.progress = None;
                let result = result.unwrap_or_else(|| JobResult {
                    success: next == JobStatus::Completed,
                    output_size_bytes: None,
                    conversion_time_ms: self.elapsed_ms(),
                    error: None,
                });
                if let Some(ref error) = result.error {
                    self.retryable = error.code.is_retryable();
                }
                self.result = Some(result);
            }
            JobStatus::Pending | JobStatus::Queued => {}
        }

        self.status = next;
        Ok(())
    }

    /// Milliseconds since processing started, or zero if it never did.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|started| (Utc::now() - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Whether a caller may resubmit this job.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retryable && self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            PathBuf::from("/in/clip.mov"),
            PathBuf::from("/out/clip.mp4"),
            ConversionSettings::default(),
            0,
        )
    }

    #[test]
    fn test_terminal_states_are_closed() {
        let all = [
            JobStatus::Pending,
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_processing_sets_started_and_progress() {
        let mut job = job();
        job.duration_secs = Some(60.0);
        job.transition_to(JobStatus::Queued, None).unwrap();
        assert!(job.progress.is_none());
        job.transition_to(JobStatus::Processing, None).unwrap();

        assert!(job.started_at.is_some());
        let progress = job.progress.as_ref().unwrap();
        assert_eq!(progress.total_time, Some(60.0));
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn test_terminal_clears_progress_and_sets_result() {
        let mut job = job();
        job.transition_to(JobStatus::Queued, None).unwrap();
        job.transition_to(JobStatus::Processing, None).unwrap();
        job.transition_to(
            JobStatus::Failed,
            Some(JobResult {
                success: false,
                output_size_bytes: None,
                conversion_time_ms: 10,
                error: Some(JobError::new(ErrorCode::SpawnFailed, "no ffmpeg")),
            }),
        )
        .unwrap();

        assert!(job.progress.is_none());
        assert!(job.completed_at.is_some());
        assert!(!job.retryable);
        assert!(!job.can_retry());
        assert_eq!(
            job.result.as_ref().unwrap().error.as_ref().unwrap().code,
            ErrorCode::SpawnFailed
        );
    }

    #[test]
    fn test_cancel_before_start_has_result_without_error() {
        let mut job = job();
        job.transition_to(JobStatus::Cancelled, None).unwrap();
        let result = job.result.unwrap();
        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(result.conversion_time_ms, 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_invalid_transition_leaves_job_unchanged() {
        let mut job = job();
        let before = job.clone();
        let err = job.transition_to(JobStatus::Completed, None).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(job, before);
    }

    #[test]
    fn test_expected_output_secs_with_trim() {
        let mut job = job();
        assert_eq!(job.expected_output_secs(), None);

        job.duration_secs = Some(100.0);
        assert_eq!(job.expected_output_secs(), Some(100.0));

        job.settings = job.settings.clone().with_trim(Some(10.0), Some(40.0));
        assert_eq!(job.expected_output_secs(), Some(30.0));

        job.settings = job.settings.clone().with_trim(Some(90.0), None);
        assert_eq!(job.expected_output_secs(), Some(10.0));
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }
}
