//! Trait definitions for the encoder module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::EncoderError;
use super::types::{MediaInfo, RunHandle, RunRequest, RunnerEvent};

/// Launches and supervises encoder processes.
///
/// A runner knows nothing about other jobs or the global concurrency limit.
/// Each started run reports zero or more `Progress` events followed by
/// exactly one `Exited` event on the supplied channel.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Starts a run in the background and returns its control handle.
    fn start(&self, request: RunRequest, events: mpsc::UnboundedSender<RunnerEvent>) -> RunHandle;

    /// Validates that the runner is properly configured and ready.
    async fn validate(&self) -> Result<(), EncoderError>;
}

/// Reads duration and stream details from a media file.
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Returns the name of this inspector implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn inspect(&self, path: &Path) -> Result<MediaInfo, EncoderError>;
}
