//! Testing utilities and mock implementations.
//!
//! [`MockRunner`] stands in for the ffmpeg supervisor so orchestrator
//! behaviour can be tested without spawning processes, and
//! [`MockInspector`] replaces ffprobe.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidqueue_core::testing::{fixtures, MockRunner};
//!
//! let dir = tempfile::TempDir::new()?;
//! let runner = Arc::new(MockRunner::new());
//! let orchestrator = Orchestrator::new(QueueConfig::default(), runner.clone(), EventBus::new());
//!
//! let id = orchestrator.submit(fixtures::submit_request(dir.path(), "clip")).await?;
//! runner.exit_with_code(&id, 1);
//! ```

mod mock_inspector;
mod mock_runner;

pub use mock_inspector::MockInspector;
pub use mock_runner::{MockRunner, MOCK_OUTPUT_SIZE};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::encoder::MediaInfo;
    use crate::orchestrator::SubmitRequest;

    /// Create media info with a 1080p h264 video stream.
    pub fn media_info(path: impl AsRef<Path>, duration_secs: f64) -> MediaInfo {
        MediaInfo {
            path: path.as_ref().to_path_buf(),
            duration_secs,
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(30.0),
            bitrate_kbps: Some(5000),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
        }
    }

    /// Write a placeholder input file named `<name>.mov` under `dir`.
    pub fn input_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{}.mov", name));
        std::fs::write(&path, b"not really a video").expect("failed to write fixture input");
        path
    }

    /// A submit request for `<name>.mov` -> `out/<name>.mp4` under `dir`,
    /// with the input file created and a 10 second duration.
    pub fn submit_request(dir: &Path, name: &str) -> SubmitRequest {
        SubmitRequest::new(
            input_file(dir, name),
            dir.join("out").join(format!("{}.mp4", name)),
        )
        .with_duration(10.0)
    }
}
