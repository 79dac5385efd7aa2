//! Job status lookup

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::jobs::Job;
use crate::AppState;

/// GET /v1/jobs/:id
///
/// Terminal jobs are discarded once read.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>> {
    state
        .jobs
        .take_if_terminal(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
}
