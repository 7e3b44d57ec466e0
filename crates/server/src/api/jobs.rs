//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vidqueue_core::{
    ConversionSettings, Job, JobFilter, JobId, OrchestratorError, SubmitRequest,
};

use crate::state::AppState;

/// Maximum allowed limit for job listings
const MAX_LIMIT: usize = 1000;

/// Default limit for job listings
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub settings: ConversionSettings,
    /// Higher runs first
    pub priority: Option<i32>,
    /// Source duration; probed with ffprobe when absent
    pub duration_secs: Option<f64>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<vidqueue_core::JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SweepBody {
    /// Terminal records that finished longer ago than this are removed
    pub older_than_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub removed: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps an orchestrator error to its HTTP status.
pub fn error_response(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::InputNotFound(_) | OrchestratorError::InvalidSettings(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::DestinationExists(_)
        | OrchestratorError::NotCancellable { .. }
        | OrchestratorError::NotRetryable { .. } => StatusCode::CONFLICT,
        OrchestratorError::OutputDirectoryFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        OrchestratorError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a conversion job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    // Without a duration the job still runs, just without percentages
    let duration_secs = match body.duration_secs {
        Some(secs) => Some(secs),
        None => match state.inspector().inspect(&body.input_path).await {
            Ok(info) => Some(info.duration_secs),
            Err(e) => {
                debug!("Could not probe {}: {}", body.input_path.display(), e);
                None
            }
        },
    };

    let mut request = SubmitRequest::new(body.input_path, body.output_path)
        .with_settings(body.settings)
        .with_priority(body.priority.unwrap_or(0));
    request.duration_secs = duration_secs;

    let orchestrator = state.orchestrator();
    let id = orchestrator.submit(request).await.map_err(error_response)?;
    let job = orchestrator.get_job(&id).await.map_err(error_response)?;
    info!("Job {} submitted via API", id);

    Ok((StatusCode::CREATED, Json(job)))
}

/// List jobs, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let mut filter =
        JobFilter::new().with_limit(params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT));
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }

    let jobs = state
        .orchestrator()
        .list_jobs(filter)
        .await
        .map_err(error_response)?;

    Ok(Json(ListJobsResponse {
        count: jobs.len(),
        jobs,
    }))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .orchestrator()
        .get_job(&JobId::from(id))
        .await
        .map(Json)
        .map_err(error_response)
}

/// Cancel a job. A running job reports `processing` until its process exits.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .orchestrator()
        .cancel(&JobId::from(id))
        .await
        .map(Json)
        .map_err(error_response)
}

/// Queue a new attempt of a failed job
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let orchestrator = state.orchestrator();
    let new_id = orchestrator
        .retry(&JobId::from(id))
        .await
        .map_err(error_response)?;
    let job = orchestrator.get_job(&new_id).await.map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// Remove old completed and failed records
pub async fn sweep_jobs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SweepBody>,
) -> Result<Json<SweepResponse>, ApiError> {
    let removed = state
        .orchestrator()
        .clear_older_than(Duration::from_secs(body.older_than_secs))
        .await
        .map_err(error_response)?;

    Ok(Json(SweepResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                OrchestratorError::InputNotFound("/a.mov".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                OrchestratorError::JobNotFound(JobId::from("x")),
                StatusCode::NOT_FOUND,
            ),
            (
                OrchestratorError::DestinationExists("/b.mp4".into()),
                StatusCode::CONFLICT,
            ),
            (OrchestratorError::Stopped, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, Json(body)) = error_response(err);
            assert_eq!(status, expected);
            assert_eq!(body.error, message);
        }
    }

    #[test]
    fn test_create_body_defaults() {
        let body: CreateJobBody =
            serde_json::from_str(r#"{"input_path": "/in.mov", "output_path": "/out.mp4"}"#)
                .unwrap();
        assert!(body.priority.is_none());
        assert!(body.duration_secs.is_none());
        assert_eq!(body.settings, ConversionSettings::default());
    }
}
