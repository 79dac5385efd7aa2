//! Health check endpoint

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::queue::QueueStats;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub queue: QueueStats,
    pub jobs_in_flight: usize,
    /// Object store name, or "disabled"
    pub storage: String,
    pub providers: ProviderHealth,
}

#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    pub bfl: bool,
    pub minimax: bool,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        queue: state.queue.stats(),
        jobs_in_flight: state.jobs.len(),
        storage: state
            .persister
            .as_ref()
            .map(|p| p.store_name().to_string())
            .unwrap_or_else(|| "disabled".to_string()),
        providers: ProviderHealth {
            bfl: state.bfl.is_configured(),
            minimax: state.minimax.is_configured(),
        },
    })
}
