//! Encoder integration: argument building, progress parsing and process
//! supervision.
//!
//! The orchestrator talks to encoders only through the [`JobRunner`] trait.
//! [`FfmpegSupervisor`] is the production implementation; it spawns one
//! ffmpeg process per job, turns its stderr into [`RunnerEvent::Progress`]
//! messages and reports a single [`RunnerEvent::Exited`] at the end.
//!
//! # Example
//!
//! ```ignore
//! use vidqueue_core::encoder::{build_args, FfmpegSupervisor, JobRunner, RunRequest};
//!
//! let supervisor = FfmpegSupervisor::with_defaults();
//! supervisor.validate().await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = supervisor.start(
//!     RunRequest {
//!         job_id: job.id.clone(),
//!         args: build_args(&job),
//!         output_path: job.output_path.clone(),
//!         initial_progress: ProgressSnapshot::starting(job.expected_output_secs()),
//!     },
//!     tx,
//! );
//! ```

mod args;
mod config;
mod error;
mod inspect;
pub mod progress;
mod supervisor;
mod traits;
mod types;

pub use args::{build_args, build_args_for, DEFAULT_AUDIO_CODEC};
pub use config::EncoderConfig;
pub use error::EncoderError;
pub use inspect::FfprobeInspector;
pub use progress::{feed, is_progress_line};
pub use supervisor::FfmpegSupervisor;
pub use traits::{Inspector, JobRunner};
pub use types::{MediaInfo, RunHandle, RunOutcome, RunRequest, RunnerEvent};
