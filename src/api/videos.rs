//! MiniMax video endpoints: submit, status, download

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{persist_artifact, preview, required};
use crate::error::{AppError, Result};
use crate::jobs::{Job, JobKind, JobState};
use crate::provider::minimax::DEFAULT_VIDEO_MODEL;
use crate::provider::{VideoRequest, VideoTaskStatus};
use crate::storage::{sanitize_file_name, ArtifactKind, PersistedArtifact};
use crate::AppState;

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_aspect_ratio() -> Option<String> {
    Some("16:9".to_string())
}

fn default_quality() -> String {
    "HD".to_string()
}

fn default_duration() -> u32 {
    6
}

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_video_model")]
    pub model: String,
    #[serde(default = "default_aspect_ratio", alias = "selectedAspectRatio")]
    pub aspect_ratio: Option<String>,
    #[serde(default = "default_quality", alias = "selectedQuality")]
    pub quality: String,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub first_frame_image: Option<String>,
    #[serde(default)]
    pub subject_reference: Option<Value>,
    /// Poll to completion and return the stored video
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CreateVideoResponse {
    pub success: bool,
    pub task_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct VideoStatusRequest {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub success: bool,
    pub task_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub message: String,
    pub next_step: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadVideoRequest {
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadVideoResponse {
    pub success: bool,
    pub video_urls: Vec<String>,
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Hint for the caller's next request
pub fn next_step(status: &VideoTaskStatus, has_file: bool) -> &'static str {
    match status {
        VideoTaskStatus::Success if has_file => {
            "Call /v1/videos/download with the file_id to get the video URL"
        }
        VideoTaskStatus::Fail => "Video generation failed",
        _ => "Continue polling for status updates",
    }
}

fn video_file_name(file_id: &str) -> String {
    format!("video_{}.mp4", sanitize_file_name(file_id))
}

/// Resolve a file id and copy the video into storage
async fn fetch_video(state: &AppState, file_id: &str) -> Result<(String, PersistedArtifact)> {
    let download_url = state.minimax.retrieve_file(file_id).await?;
    let persisted = persist_artifact(state, &download_url, &video_file_name(file_id), ArtifactKind::Video).await;
    Ok((download_url, persisted))
}

/// POST /v1/videos
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateVideoRequest>,
) -> Result<Json<CreateVideoResponse>> {
    let prompt = required(&body.prompt, "Prompt is required")?.to_string();

    let request = VideoRequest {
        prompt,
        model: body.model,
        aspect_ratio: body.aspect_ratio,
        quality: body.quality,
        duration: body.duration,
        first_frame_image: body.first_frame_image,
        subject_reference: body.subject_reference,
    };
    info!(
        model = %request.model,
        prompt = %preview(&request.prompt, 100),
        wait = body.wait,
        "Video generation requested"
    );

    let minimax = state.minimax.clone();
    let task_id = state
        .queue
        .enqueue(move || async move { minimax.submit_video(&request).await })
        .await?;

    if !body.wait {
        return Ok(Json(CreateVideoResponse {
            success: true,
            task_id,
            message: "Video generation task submitted successfully. Use the task_id to poll for status."
                .to_string(),
            next_step: Some("Call /v1/videos/status with the task_id to check progress".to_string()),
            ..Default::default()
        }));
    }

    let mut job = Job::new(&task_id, JobKind::Video, &task_id);
    let _guard = state.jobs.track(job.clone());
    let outcome = state.poller.poll(state.minimax.as_ref(), &mut job).await;

    let result = outcome.into_result()?;
    let file_id = result
        .payload
        .get("file_id")
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BackendError("Video task succeeded without a file_id".to_string()))?;

    let (download_url, persisted) = match fetch_video(&state, &file_id).await {
        Ok(fetched) => fetched,
        Err(e) => {
            job.transition(JobState::Failed, Some(e.to_string()));
            state.jobs.record(&job);
            return Err(e);
        }
    };
    job.result = Some(persisted.url.clone());
    state.jobs.record(&job);

    Ok(Json(CreateVideoResponse {
        success: true,
        task_id,
        message: "Video generated successfully".to_string(),
        file_id: Some(file_id),
        video_url: Some(persisted.url),
        original_video_url: Some(download_url),
        storage_path: persisted.storage_path,
        storage_warning: persisted.degraded,
        poll_attempts: Some(job.attempts),
        ..Default::default()
    }))
}

/// POST /v1/videos/status
pub async fn video_status(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VideoStatusRequest>,
) -> Result<Json<VideoStatusResponse>> {
    let task_id = required(&body.task_id, "Task ID is required")?;

    let report = state.minimax.query_video(task_id).await?;
    let status = report.status.label().to_string();

    Ok(Json(VideoStatusResponse {
        success: true,
        task_id: report.task_id.clone(),
        next_step: next_step(&report.status, report.file_id.is_some()).to_string(),
        message: format!("Task status: {}", status),
        status,
        file_id: report.file_id,
    }))
}

/// POST /v1/videos/download
pub async fn download_video(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DownloadVideoRequest>,
) -> Result<Json<DownloadVideoResponse>> {
    let file_id = required(&body.file_id, "File ID is required")?.to_string();

    let (_, persisted) = fetch_video(&state, &file_id).await?;

    let response = match persisted.degraded {
        None => DownloadVideoResponse {
            success: true,
            video_urls: vec![persisted.url],
            file_id,
            message: if persisted.storage_path.is_some() {
                "Video downloaded and stored successfully".to_string()
            } else {
                "Video available at the vendor URL".to_string()
            },
            storage_path: persisted.storage_path,
            error: None,
        },
        Some(reason) => {
            warn!(file_id = %file_id, reason = %reason, "Relaying vendor video URL");
            DownloadVideoResponse {
                success: true,
                video_urls: vec![persisted.url],
                file_id,
                storage_path: None,
                message: "Video relayed using the original URL because storage failed".to_string(),
                error: Some(reason),
            }
        }
    };

    Ok(Json(response))
}
