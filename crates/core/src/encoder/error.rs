//! Error types for the encoder module.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::{ErrorCode, JobError};

/// Errors raised when launching or probing encoder binaries.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The process could not be started.
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },

    /// I/O error while talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Maps a spawn error from `Command::spawn`.
    pub fn from_spawn(program: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FfmpegNotFound {
                path: program.to_path_buf(),
            }
        } else {
            Self::SpawnFailed {
                program: program.display().to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Converts into the error recorded on a job.
    pub fn into_job_error(self) -> JobError {
        let code = match self {
            Self::FfmpegNotFound { .. } | Self::FfprobeNotFound { .. } | Self::SpawnFailed { .. } => {
                ErrorCode::SpawnFailed
            }
            _ => ErrorCode::Io,
        };
        JobError::new(code, self.to_string())
    }
}
