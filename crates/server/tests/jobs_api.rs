//! In-process API tests with a mocked encoder.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use vidqueue_core::{JobEvent, QueueConfig};

use common::{fixtures, TestFixture};

const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::with_queue(QueueConfig::default().with_max_concurrent(3)).await;
    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["queue"]["max_concurrent"], 3);
    assert_eq!(response.body["encoder"]["ffmpeg_path"], "ffmpeg");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.submit("metered", 0).await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("vidqueue_jobs_submitted_total"));
    assert!(body.contains("vidqueue_http_requests_total"));
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_create_job_starts_immediately() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("clip", 0).await;

    assert!(fixture.runner.wait_for_started(1, WAIT).await);
    let job = fixture.wait_for_status(&id, "processing").await;
    assert_eq!(job["duration_secs"], 10.0);
    assert!(job["started_at"].is_string());
}

#[tokio::test]
async fn test_create_job_probes_missing_duration() {
    let fixture = TestFixture::new().await;
    let input = fixture.input("probed");
    fixture
        .inspector
        .set_result(&input, fixtures::media_info(&input, 42.5))
        .await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({ "input_path": input, "output_path": fixture.output("probed") }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["duration_secs"], 42.5);
    assert_eq!(fixture.inspector.inspected().await, vec![input]);
}

#[tokio::test]
async fn test_create_job_without_probe_result_still_queues() {
    let fixture = TestFixture::new().await;
    fixture.inspector.set_default_duration(None).await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "input_path": fixture.input("unprobed"),
                "output_path": fixture.output("unprobed"),
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.body.get("duration_secs").is_none());
}

#[tokio::test]
async fn test_create_job_missing_input() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "input_path": fixture.temp_dir.path().join("missing.mov"),
                "output_path": fixture.output("missing"),
                "duration_secs": 5.0,
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("input file not found"));

    let list = fixture.get("/api/v1/jobs").await;
    assert_eq!(list.body["count"], 0);
    assert_eq!(fixture.runner.started_jobs().len(), 0);
}

#[tokio::test]
async fn test_create_job_existing_destination_conflicts() {
    let fixture = TestFixture::new().await;
    let output = fixture.output("taken");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"old").unwrap();

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "input_path": fixture.input("taken"),
                "output_path": output,
                "duration_secs": 5.0,
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_job_malformed_body() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/jobs", json!({ "input_path": "/only-input.mov" }))
        .await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_get_unknown_job() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/jobs/does-not-exist").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_with_status_filter() {
    let fixture = TestFixture::with_queue(QueueConfig::default().with_max_concurrent(1)).await;
    let running = fixture.submit("first", 0).await;
    let waiting = fixture.submit("second", 0).await;

    let all = fixture.get("/api/v1/jobs").await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["count"], 2);
    // Newest first
    assert_eq!(all.body["jobs"][0]["id"], waiting.as_str());

    let queued = fixture.get("/api/v1/jobs?status=queued").await;
    assert_eq!(queued.body["count"], 1);
    assert_eq!(queued.body["jobs"][0]["id"], waiting.as_str());

    let processing = fixture.get("/api/v1/jobs?status=processing&limit=5").await;
    assert_eq!(processing.body["jobs"][0]["id"], running.as_str());

    let limited = fixture.get("/api/v1/jobs?limit=1").await;
    assert_eq!(limited.body["count"], 1);
}

#[tokio::test]
async fn test_progress_visible_on_job() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("progress", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);

    fixture
        .runner
        .emit_progress(&id, "out_time_us=5000000\nprogress=continue\n");

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await.body;
        if job["progress"]["percentage"] == 50.0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "progress not applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_completed_job_reports_result() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("done", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);

    fixture.runner.complete(&id);
    let job = fixture.wait_for_status(&id, "completed").await;
    assert_eq!(job["result"]["success"], true);
    assert_eq!(job["result"]["output_size_bytes"], 1024);
}

// =============================================================================
// Cancel and retry
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_job() {
    let fixture = TestFixture::with_queue(QueueConfig::default().paused()).await;
    let id = fixture.submit("held", 0).await;

    let response = fixture.delete(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "cancelled");

    // Terminal jobs reject a second cancel and keep their record
    let again = fixture.delete(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(job.body, response.body);
}

#[tokio::test]
async fn test_cancel_running_job() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("running", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);

    let response = fixture.delete(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);

    let job = fixture.wait_for_status(&id, "cancelled").await;
    assert_eq!(job["result"]["success"], false);
    assert!(!fixture.runner.is_running(&id));
}

#[tokio::test]
async fn test_cancel_completed_job_conflicts() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("finished", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);
    fixture.runner.complete(&id);
    fixture.wait_for_status(&id, "completed").await;

    let response = fixture.delete(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_retry_failed_job() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("flaky", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);

    fixture.runner.exit_with_code(&id, 1);
    let failed = fixture.wait_for_status(&id, "failed").await;
    assert_eq!(failed["result"]["error"]["code"], "exited_non_zero");

    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_ne!(response.body["id"], id.as_str());
    assert_eq!(response.body["retry_count"], 1);

    // The original attempt cannot be retried twice
    let twice = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_eq!(twice.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_retry_non_failed_job_conflicts() {
    let fixture = TestFixture::with_queue(QueueConfig::default().paused()).await;
    let id = fixture.submit("waiting", 0).await;

    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_sweep_removes_finished_jobs() {
    let fixture = TestFixture::new().await;
    let id = fixture.submit("old", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);
    fixture.runner.complete(&id);
    fixture.wait_for_status(&id, "completed").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = fixture
        .post("/api/v1/jobs/sweep", json!({ "older_than_secs": 0 }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["removed"], 1);

    let gone = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Queue control
// =============================================================================

#[tokio::test]
async fn test_queue_status() {
    let fixture = TestFixture::with_queue(QueueConfig::default().with_max_concurrent(1)).await;
    fixture.submit("a", 0).await;
    fixture.submit("b", 0).await;

    let response = fixture.get("/api/v1/queue").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["running"], true);
    assert_eq!(response.body["max_concurrent"], 1);
    assert_eq!(response.body["processing_count"], 1);
    assert_eq!(response.body["queued_count"], 1);
}

#[tokio::test]
async fn test_set_concurrency_clamps_and_admits() {
    let fixture = TestFixture::with_queue(QueueConfig::default().with_max_concurrent(1)).await;
    for name in ["a", "b", "c"] {
        fixture.submit(name, 0).await;
    }
    assert!(fixture.runner.wait_for_started(1, WAIT).await);

    let response = fixture
        .put("/api/v1/queue/concurrency", json!({ "limit": 50 }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["max_concurrent"], 8);
    assert!(fixture.runner.wait_for_started(3, WAIT).await);

    let response = fixture
        .put("/api/v1/queue/concurrency", json!({ "limit": 0 }))
        .await;
    assert_eq!(response.body["max_concurrent"], 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let fixture = TestFixture::new().await;

    let paused = fixture.post_empty("/api/v1/queue/pause").await;
    assert_eq!(paused.status, StatusCode::OK);
    assert_eq!(paused.body["paused"], true);

    let id = fixture.submit("later", 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fixture.runner.started_jobs().is_empty());
    fixture.wait_for_status(&id, "queued").await;

    let resumed = fixture.post_empty("/api/v1/queue/resume").await;
    assert_eq!(resumed.body["paused"], false);
    fixture.wait_for_status(&id, "processing").await;
}

// =============================================================================
// Event stream
// =============================================================================

#[tokio::test]
async fn test_broadcaster_receives_lifecycle_events() {
    let fixture = TestFixture::new().await;
    let mut rx = fixture.broadcaster.subscribe();

    let id = fixture.submit("streamed", 0).await;
    assert!(fixture.runner.wait_for_started(1, WAIT).await);
    fixture.runner.complete(&id);

    let mut kinds = Vec::new();
    let collect = async {
        while let Ok(event) = rx.recv().await {
            let done = matches!(event, JobEvent::JobCompleted { .. });
            kinds.push(event.kind().as_str());
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(WAIT, collect)
        .await
        .expect("no completion event");

    assert!(kinds.contains(&"job_started"));
    assert!(kinds.contains(&"queue_updated"));
    assert_eq!(kinds.last(), Some(&"job_completed"));
}
