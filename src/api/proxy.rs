//! Image relay for hosts browsers cannot fetch directly

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::AppState;

const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const DOWNLOAD_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Accept only http(s) URLs containing one of the allowed host substrings
pub fn check_allowed(url: Option<&str>, allowed_hosts: &[String]) -> Result<String> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing image URL".to_string()))?;

    let is_http = url.starts_with("https://") || url.starts_with("http://");
    if !is_http || !allowed_hosts.iter().any(|host| url.contains(host.as_str())) {
        return Err(AppError::InvalidRequest("Invalid image URL".to_string()));
    }
    Ok(url.to_string())
}

/// Fetch the image, returning its content type and bytes
async fn fetch_image(state: &AppState, url: &str, fallback_type: &str) -> Result<(String, Vec<u8>)> {
    let response = state
        .http
        .get(url)
        .header(reqwest::header::ACCEPT, "image/*")
        .header("ngrok-skip-browser-warning", "true")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        warn!(url = %url, status = %status, "Failed to fetch image");
        return Err(AppError::Upstream {
            provider: "Image host".to_string(),
            status: status.as_u16(),
            body: format!("Failed to fetch image: {}", status.as_u16()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback_type)
        .to_string();
    let data = response.bytes().await?.to_vec();

    debug!(url = %url, size = data.len(), content_type = %content_type, "Relaying image");
    Ok((content_type, data))
}

/// GET /v1/proxy/image?url=
pub async fn proxy_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    let url = check_allowed(query.url.as_deref(), &state.settings.proxy.allowed_hosts)?;
    let (content_type, data) = fetch_image(&state, &url, "image/png").await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
        ],
        data,
    )
        .into_response())
}

/// GET /v1/proxy/download?url=&filename=
pub async fn proxy_download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    let url = check_allowed(query.url.as_deref(), &state.settings.proxy.allowed_hosts)?;
    let filename = query
        .filename
        .as_deref()
        .map(|f| f.replace(|c: char| matches!(c, '"' | '\r' | '\n'), ""))
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "image.jpg".to_string());
    let (content_type, data) = fetch_image(&state, &url, "image/jpeg").await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
            (header::CACHE_CONTROL, DOWNLOAD_CACHE_CONTROL.to_string()),
        ],
        data,
    )
        .into_response())
}
