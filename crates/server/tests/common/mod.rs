//! Common test utilities for in-process API tests.
//!
//! The fixture builds the full router around a real orchestrator whose
//! runner and inspector are mocks, so no ffmpeg is needed.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vidqueue_core::testing::{MockInspector, MockRunner};
use vidqueue_core::{Config, EventBus, JobId, Orchestrator, QueueConfig};
use vidqueue_server::api::{create_router, WsBroadcaster};
use vidqueue_server::state::AppState;

/// Re-export fixtures for test convenience
pub use vidqueue_core::testing::fixtures;

/// In-process server with a held mock runner.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new().await;
/// let input = fixture.input("clip");
///
/// let response = fixture.post("/api/v1/jobs", json!({
///     "input_path": input,
///     "output_path": fixture.output("clip"),
/// })).await;
///
/// assert_eq!(response.status, StatusCode::CREATED);
/// ```
pub struct TestFixture {
    pub router: Router,
    pub orchestrator: Orchestrator,
    /// Mock runner - resolve runs on demand
    pub runner: Arc<MockRunner>,
    /// Mock inspector - configure probed durations
    pub inspector: Arc<MockInspector>,
    pub broadcaster: WsBroadcaster,
    /// Holds inputs and outputs
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_queue(QueueConfig::default()).await
    }

    pub async fn with_queue(queue: QueueConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let runner = Arc::new(MockRunner::new());
        let inspector = Arc::new(MockInspector::new());

        let config = Config {
            queue: queue.clone(),
            ..Default::default()
        };

        let bus = EventBus::new();
        let broadcaster = WsBroadcaster::default();
        // Subscriptions stay registered until the bus is cleared
        let _ = broadcaster.attach(&bus);

        let orchestrator = Orchestrator::new(queue, runner.clone(), bus);
        let state = Arc::new(AppState::new(
            config,
            orchestrator.clone(),
            inspector.clone(),
            broadcaster.clone(),
        ));

        Self {
            router: create_router(state),
            orchestrator,
            runner,
            inspector,
            broadcaster,
            temp_dir,
        }
    }

    /// Creates `<name>.mov` in the temp dir and returns its path.
    pub fn input(&self, name: &str) -> PathBuf {
        fixtures::input_file(self.temp_dir.path(), name)
    }

    /// Output path `out/<name>.mp4` in the temp dir.
    pub fn output(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("out").join(format!("{}.mp4", name))
    }

    /// Submits a job for `<name>` through the API and returns its id.
    pub async fn submit(&self, name: &str, priority: i32) -> JobId {
        let response = self
            .post(
                "/api/v1/jobs",
                serde_json::json!({
                    "input_path": self.input(name),
                    "output_path": self.output(name),
                    "priority": priority,
                    "duration_secs": 10.0,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        JobId::from(response.body["id"].as_str().expect("job id"))
    }

    /// Polls the API until the job reports `status`.
    pub async fn wait_for_status(&self, id: &JobId, status: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            if response.body["status"] == status {
                return response.body;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "job {} did not reach {} (last: {})",
                    id, status, response.body
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// POST without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Raw text body, for endpoints that do not return JSON.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
