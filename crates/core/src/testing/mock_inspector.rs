//! Mock media inspector for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::encoder::{EncoderError, Inspector, MediaInfo};

/// Mock implementation of the Inspector trait.
///
/// Returns pre-configured results by path, falling back to a default
/// duration for unknown paths.
#[derive(Debug, Clone)]
pub struct MockInspector {
    results: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    default_duration: Arc<RwLock<Option<f64>>>,
    inspected: Arc<RwLock<Vec<PathBuf>>>,
}

impl Default for MockInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInspector {
    /// Create a mock inspector that reports 60 seconds for any file.
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(HashMap::new())),
            default_duration: Arc::new(RwLock::new(Some(60.0))),
            inspected: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the result for a specific path.
    pub async fn set_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Set the duration reported for unknown paths. `None` makes them fail.
    pub async fn set_default_duration(&self, secs: Option<f64>) {
        *self.default_duration.write().await = secs;
    }

    /// Paths inspected so far.
    pub async fn inspected(&self) -> Vec<PathBuf> {
        self.inspected.read().await.clone()
    }
}

#[async_trait]
impl Inspector for MockInspector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn inspect(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        self.inspected.write().await.push(path.to_path_buf());

        if let Some(info) = self.results.read().await.get(path) {
            return Ok(info.clone());
        }

        match *self.default_duration.read().await {
            Some(duration) => Ok(super::fixtures::media_info(path, duration)),
            None => Err(EncoderError::probe_failed(format!(
                "no mock result for {}",
                path.display()
            ))),
        }
    }
}
