//! MiniMax client for video and music generation
//!
//! Video is asynchronous (task id → status → file id → download URL); music
//! answers synchronously with hex-encoded audio.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::MiniMaxConfig;
use crate::error::{AppError, Result};
use crate::jobs::{JobResult, JobStatus, StatusSource};
use crate::provider::{http_client, require_key};

const PROVIDER: &str = "MiniMax";

pub const DEFAULT_VIDEO_MODEL: &str = "MiniMax-Hailuo-02";
pub const VIDEO_MODELS: [&str; 4] = ["MiniMax-Hailuo-02", "T2V-01-Director", "I2V-01-Director", "S2V-01"];

/// Known model name, or the default model
pub fn resolve_video_model(model: &str) -> &'static str {
    VIDEO_MODELS
        .iter()
        .copied()
        .find(|m| *m == model)
        .unwrap_or(DEFAULT_VIDEO_MODEL)
}

/// Output resolution for a model and a UI quality label
pub fn resolution_for(model: &str, quality: &str) -> &'static str {
    let high = matches!(quality, "FullHD" | "Full HD" | "2K");
    match model {
        // Director models only render 768P
        "T2V-01-Director" | "I2V-01-Director" => "768P",
        _ if high => "1080P",
        _ => "768P",
    }
}

/// Video generation parameters
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub model: String,
    pub aspect_ratio: Option<String>,
    pub quality: String,
    pub duration: u32,
    pub first_frame_image: Option<String>,
    pub subject_reference: Option<Value>,
}

impl VideoRequest {
    /// Vendor payload; optional inputs are only sent to models that accept them
    pub fn payload(&self) -> Value {
        let model = resolve_video_model(&self.model);
        let mut payload = json!({
            "model": model,
            "prompt": self.prompt,
            "duration": self.duration,
            "resolution": resolution_for(model, &self.quality),
            "prompt_optimizer": true,
        });

        if let Some(aspect_ratio) = self.aspect_ratio.as_ref().filter(|_| model != "S2V-01") {
            payload["aspect_ratio"] = json!(aspect_ratio);
        }
        if let Some(image) = self
            .first_frame_image
            .as_ref()
            .filter(|_| model.contains("I2V") || model == DEFAULT_VIDEO_MODEL)
        {
            payload["first_frame_image"] = json!(image);
        }
        if let Some(reference) = self.subject_reference.as_ref().filter(|_| model == "S2V-01") {
            payload["subject_reference"] = reference.clone();
        }
        payload
    }
}

/// Status vocabulary of the video query endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VideoTaskStatus {
    Queueing,
    Preparing,
    Processing,
    Success,
    Fail,
    Unknown(String),
}

impl VideoTaskStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Queueing" => Self::Queueing,
            "Preparing" => Self::Preparing,
            "Processing" => Self::Processing,
            "Success" => Self::Success,
            "Fail" => Self::Fail,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Queueing => "Queueing",
            Self::Preparing => "Preparing",
            Self::Processing => "Processing",
            Self::Success => "Success",
            Self::Fail => "Fail",
            Self::Unknown(s) => s,
        }
    }
}

/// One answer of the video query endpoint
#[derive(Debug, Clone)]
pub struct VideoStatusReport {
    pub task_id: String,
    pub status: VideoTaskStatus,
    pub file_id: Option<String>,
    pub message: Option<String>,
    pub raw: Value,
}

impl VideoStatusReport {
    fn from_body(task_id: &str, body: Value) -> Self {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .map(VideoTaskStatus::parse)
            .unwrap_or_else(|| VideoTaskStatus::Unknown(String::new()));
        let file_id = body.get("file_id").and_then(json_id);
        let message = base_resp_message(&body);
        Self {
            task_id: task_id.to_string(),
            status,
            file_id,
            message,
            raw: body,
        }
    }

    /// Map onto the poller's status
    pub fn normalize(&self) -> JobStatus {
        match &self.status {
            VideoTaskStatus::Success => JobStatus::Ready(JobResult::new(None, self.raw.clone())),
            VideoTaskStatus::Fail => JobStatus::Failed(
                self.message
                    .clone()
                    .filter(|m| !m.is_empty() && m != "success")
                    .unwrap_or_else(|| "Fail".to_string()),
            ),
            _ => JobStatus::Pending,
        }
    }
}

/// Music generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicRequest {
    pub model: String,
    pub prompt: String,
    pub lyrics: String,
    pub audio_setting: AudioSetting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSetting {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_audio_format")]
    pub format: String,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_bitrate() -> u32 {
    256000
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

impl Default for AudioSetting {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            bitrate: default_bitrate(),
            format: default_audio_format(),
        }
    }
}

/// Generated audio
#[derive(Debug, Clone)]
pub struct MusicOutput {
    /// Hex-encoded audio as delivered by the vendor
    pub audio_hex: String,
    pub format: String,
}

/// HTTP client for the MiniMax API
pub struct MiniMaxClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    group_id: Option<String>,
}

impl MiniMaxClient {
    pub fn new(config: &MiniMaxConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_ms)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            group_id: config.group_id.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        require_key(&self.api_key, PROVIDER).is_ok()
    }

    /// Group id for file retrieval: configured, else the key's claim
    pub fn group_id(&self) -> String {
        self.group_id
            .clone()
            .or_else(|| self.api_key.as_deref().and_then(group_id_from_token))
            .unwrap_or_else(|| "default_group".to_string())
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    base_resp_message(&v)
                        .or_else(|| v.get("message").and_then(Value::as_str).map(str::to_string))
                })
                .unwrap_or(text);
            error!(status = %status, message = %message, "MiniMax request rejected");
            return Err(AppError::Upstream {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body: message,
            });
        }

        serde_json::from_str(&text)
            .map_err(|_| AppError::BackendError("Invalid JSON response from MiniMax API".to_string()))
    }

    /// Create a video task and return its id
    pub async fn submit_video(&self, request: &VideoRequest) -> Result<String> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let payload = request.payload();
        debug!(model = %payload["model"], resolution = %payload["resolution"], "Creating video task");

        let response = self
            .client
            .post(format!("{}/video_generation", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let body = self.read_json(response).await?;
        if let Some(message) = base_resp_error(&body) {
            return Err(AppError::BackendError(format!("MiniMax API error: {}", message)));
        }

        body.get("task_id")
            .and_then(json_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::BackendError(format!("No task ID received from MiniMax API. Response: {}", body))
            })
    }

    /// Query a video task once
    pub async fn query_video(&self, task_id: &str) -> Result<VideoStatusReport> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let response = self
            .client
            .get(format!("{}/query/video_generation", self.base_url))
            .query(&[("task_id", task_id)])
            .bearer_auth(api_key)
            .send()
            .await?;

        let body = self.read_json(response).await?;
        if let Some(message) = base_resp_error(&body) {
            return Err(AppError::BackendError(format!("MiniMax API error: {}", message)));
        }

        let report = VideoStatusReport::from_body(task_id, body);
        debug!(task_id = %task_id, status = report.status.label(), "Video task status");
        Ok(report)
    }

    /// Resolve a generated file id to its download URL
    pub async fn retrieve_file(&self, file_id: &str) -> Result<String> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let group_id = self.group_id();
        let response = self
            .client
            .get(format!("{}/files/retrieve", self.base_url))
            .query(&[("GroupId", group_id.as_str()), ("file_id", file_id)])
            .bearer_auth(api_key)
            .send()
            .await?;

        let body = self.read_json(response).await?;
        if let Some(message) = base_resp_error(&body) {
            return Err(AppError::BackendError(format!("MiniMax API error: {}", message)));
        }

        body.pointer("/file/download_url")
            .or_else(|| body.pointer("/file/backup_download_url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BackendError("No download URL in file retrieval response".to_string()))
    }

    /// Generate a song; the vendor answers when the audio is ready
    pub async fn generate_music(&self, request: &MusicRequest) -> Result<MusicOutput> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        debug!(model = %request.model, "Requesting music generation");

        let response = self
            .client
            .post(format!("{}/music_generation", self.base_url))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let body = self.read_json(response).await?;
        if let Some(message) = base_resp_error(&body) {
            return Err(AppError::BackendError(format!("MiniMax API error: {}", message)));
        }

        let audio_hex = body
            .pointer("/data/audio")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AppError::BackendError("No audio data received from MiniMax API".to_string()))?;

        Ok(MusicOutput {
            audio_hex: audio_hex.to_string(),
            format: request.audio_setting.format.clone(),
        })
    }
}

#[async_trait]
impl StatusSource for MiniMaxClient {
    fn name(&self) -> &str {
        "minimax"
    }

    async fn check(&self, handle: &str) -> Result<JobStatus> {
        Ok(self.query_video(handle).await?.normalize())
    }
}

/// Ids arrive as strings or numbers depending on the endpoint
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn base_resp_message(body: &Value) -> Option<String> {
    body.pointer("/base_resp/status_msg")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Error message when `base_resp.status_code` is non-zero
fn base_resp_error(body: &Value) -> Option<String> {
    let code = body.pointer("/base_resp/status_code").and_then(Value::as_i64)?;
    if code == 0 {
        return None;
    }
    Some(base_resp_message(body).unwrap_or_else(|| format!("status code {}", code)))
}

/// Read the `GroupID` claim from a JWT-style API key
pub fn group_id_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let trimmed = payload.trim_end_matches('=');
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("GroupID").and_then(json_id)
}
