//! Reference image uploads

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::api::required;
use crate::error::{AppError, Result};
use crate::storage::{base64, extension_for, sniff_image_type, ArtifactKind, StorageError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Base64 payload or `data:` URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "fileName")]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub image_url: String,
    pub path: String,
    pub file_name: String,
    pub file_size: usize,
    pub content_type: String,
}

/// Check an upload is a non-empty image within the size limit
pub fn validate_upload(data: &[u8], content_type: &str, max_bytes: usize) -> Result<()> {
    if data.is_empty() {
        return Err(AppError::InvalidRequest("File is empty".to_string()));
    }
    if !content_type.starts_with("image/") {
        return Err(AppError::InvalidRequest(format!(
            "File must be an image. Received: {}",
            content_type
        )));
    }
    if data.len() > max_bytes {
        let mib = |bytes: usize| bytes as f64 / 1024.0 / 1024.0;
        return Err(AppError::InvalidRequest(format!(
            "File size must be less than {:.0}MB. Received: {:.2}MB",
            mib(max_bytes),
            mib(data.len())
        )));
    }
    Ok(())
}

/// POST /v1/uploads
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<UploadResponse>> {
    let encoded = required(&body.image, "No file provided")?;
    let persister = state
        .persister
        .as_ref()
        .ok_or_else(|| StorageError::unknown("Object storage is disabled"))?;

    let upload = base64::decode_upload(encoded)?;
    let content_type = upload
        .declared_type
        .clone()
        .or_else(|| sniff_image_type(&upload.data).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    validate_upload(&upload.data, &content_type, state.settings.storage.max_upload_bytes)?;

    let file_name = body
        .file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("upload.{}", extension_for(&content_type)));
    let file_size = upload.data.len();

    let mut metadata = BTreeMap::new();
    metadata.insert("originalName".to_string(), file_name.clone());

    let stored = persister
        .store_bytes(upload.data, &file_name, ArtifactKind::Upload, content_type.clone(), metadata)
        .await?;

    info!(path = %stored.storage_path, size = file_size, "Reference image uploaded");

    Ok(Json(UploadResponse {
        success: true,
        image_url: stored.permanent_url,
        path: stored.storage_path,
        file_name,
        file_size,
        content_type,
    }))
}
