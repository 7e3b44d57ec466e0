//! Configuration for the encoder supervisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for launching ffmpeg/ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Grace period between asking the encoder to quit and killing it.
    #[serde(default = "default_termination_timeout")]
    pub termination_timeout_secs: u64,

    /// Hard limit on a single conversion. Unlimited when unset.
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,

    /// Additional global ffmpeg arguments, placed before the job's own.
    #[serde(default)]
    pub global_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_termination_timeout() -> u64 {
    5
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            log_level: default_log_level(),
            termination_timeout_secs: default_termination_timeout(),
            max_runtime_secs: None,
            global_args: Vec::new(),
        }
    }
}

impl EncoderConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the termination grace period in seconds.
    pub fn with_termination_timeout(mut self, secs: u64) -> Self {
        self.termination_timeout_secs = secs;
        self
    }

    /// Sets the runtime limit in seconds.
    pub fn with_max_runtime(mut self, secs: u64) -> Self {
        self.max_runtime_secs = Some(secs);
        self
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout_secs)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime_secs.map(Duration::from_secs)
    }

    /// Arguments placed before every job's own argument list.
    pub fn leading_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
        ];
        args.extend(self.global_args.iter().cloned());
        args
    }
}
