//! Queue control handlers.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use vidqueue_core::OrchestratorStatus;

use super::jobs::{error_response, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConcurrencyBody {
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct ConcurrencyResponse {
    /// Limit actually applied after clamping
    pub max_concurrent: usize,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status().await)
}

/// Change the concurrency limit. Out of range values are clamped.
pub async fn set_concurrency(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConcurrencyBody>,
) -> Result<Json<ConcurrencyResponse>, ApiError> {
    let applied = state
        .orchestrator()
        .set_concurrency_limit(body.limit)
        .await
        .map_err(error_response)?;
    info!("Concurrency limit set to {} (requested {})", applied, body.limit);

    Ok(Json(ConcurrencyResponse {
        max_concurrent: applied,
    }))
}

/// Stop admitting queued jobs. Running jobs continue.
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrchestratorStatus>, ApiError> {
    let orchestrator = state.orchestrator();
    orchestrator.pause().await.map_err(error_response)?;
    Ok(Json(orchestrator.status().await))
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrchestratorStatus>, ApiError> {
    let orchestrator = state.orchestrator();
    orchestrator.resume().await.map_err(error_response)?;
    Ok(Json(orchestrator.status().await))
}
