//! Common error types for the generation gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("{0} API key not configured")]
    ProviderNotConfigured(String),

    #[error("{provider} API error: {status} - {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Generation rejected by moderation: {0}")]
    Moderated(String),

    #[error("Generation timed out after {attempts} status checks")]
    GenerationTimeout { attempts: u32 },

    #[error("Submission queue is full ({0} tasks waiting)")]
    QueueFull(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status, error category and optional machine-readable code
    fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "backend_error", None),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", None),
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error", Some("rate_limit_exceeded")),
            AppError::ProviderNotConfigured(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("provider_not_configured")),
            AppError::Upstream { status, .. } => {
                let status = StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (status, "backend_error", Some("upstream_rejected"))
            }
            AppError::BackendError(_) => (StatusCode::BAD_GATEWAY, "backend_error", None),
            AppError::GenerationFailed(_) => (StatusCode::BAD_GATEWAY, "generation_error", Some("generation_failed")),
            AppError::Moderated(_) => (StatusCode::BAD_GATEWAY, "generation_error", Some("content_moderated")),
            AppError::GenerationTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout_error", Some("generation_timeout")),
            AppError::QueueFull(_) => (StatusCode::SERVICE_UNAVAILABLE, "server_error", Some("queue_full")),
            AppError::Storage(e) => (StatusCode::BAD_GATEWAY, "storage_error", Some(e.kind.code())),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }

    /// Extra diagnostic text surfaced next to the message
    fn details(&self) -> Option<String> {
        match self {
            AppError::Storage(e) => Some(e.kind.diagnostic().to_string()),
            AppError::HttpClient(e) => e.url().map(|u| u.to_string()),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.classify();

        let body = Json(ErrorResponse {
            error: self.to_string(),
            r#type: error_type.to_string(),
            code: code.map(|c| c.to_string()),
            details: self.details(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
