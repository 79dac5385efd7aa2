//! BFL Flux Kontext client
//!
//! Submissions return a polling URL; the job is then driven to completion by
//! the [`JobPoller`](crate::jobs::JobPoller) with this client as status source.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::BflConfig;
use crate::error::{AppError, Result};
use crate::jobs::{JobResult, JobStatus, StatusSource};
use crate::provider::{http_client, require_key};

const PROVIDER: &str = "BFL";

/// Kontext model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KontextModel {
    Pro,
    Max,
}

impl KontextModel {
    /// Unknown names fall back to the pro model
    pub fn from_name(name: &str) -> Self {
        match name {
            "flux-kontext-max" => Self::Max,
            _ => Self::Pro,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "flux-kontext-pro",
            Self::Max => "flux-kontext-max",
        }
    }
}

/// Body sent to the Kontext endpoints
#[derive(Debug, Clone, Serialize)]
pub struct KontextRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    pub output_format: String,
    pub prompt_upsampling: bool,
    pub safety_tolerance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

/// Body sent to the fill (inpainting) endpoints
#[derive(Debug, Clone, Serialize)]
pub struct FillRequest {
    pub image: String,
    pub mask: String,
    pub prompt: String,
    pub steps: u32,
    pub prompt_upsampling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub guidance: f64,
    pub output_format: String,
    pub safety_tolerance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finetune_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finetune_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

impl FillRequest {
    /// Finetuned fills go to their own endpoint
    pub fn endpoint(&self) -> &'static str {
        if self.finetune_id.is_some() {
            "flux-pro-1.0-fill-finetuned"
        } else {
            "flux-pro-1.0-fill"
        }
    }
}

/// Handle returned by a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BflSubmission {
    pub id: String,
    pub polling_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    polling_url: Option<String>,
}

/// Status vocabulary of the BFL result endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BflStatus {
    Pending,
    Ready,
    Error,
    Failed,
    RequestModerated,
    ContentModerated,
    TaskNotFound,
    Unknown(String),
}

impl BflStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Pending" => Self::Pending,
            "Ready" => Self::Ready,
            "Error" => Self::Error,
            "Failed" => Self::Failed,
            "Request Moderated" => Self::RequestModerated,
            "Content Moderated" => Self::ContentModerated,
            "Task not found" => Self::TaskNotFound,
            other => Self::Unknown(other.to_string()),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Error => "Error",
            Self::Failed => "Failed",
            Self::RequestModerated => "Request Moderated",
            Self::ContentModerated => "Content Moderated",
            Self::TaskNotFound => "Task not found",
            Self::Unknown(s) => s,
        }
    }

    /// Map onto the poller's status, attaching the result object when ready
    /// and the vendor's diagnosis when failed
    pub fn normalize(self, result: Option<Value>, detail: Option<String>) -> JobStatus {
        match self {
            Self::Ready => {
                let result = result.unwrap_or(Value::Null);
                let url = result
                    .get("sample")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                JobStatus::Ready(JobResult::new(url, result))
            }
            Self::Error | Self::Failed | Self::TaskNotFound => JobStatus::Failed(match detail {
                Some(detail) => format!("{}: {}", self.label(), detail),
                None => self.label().to_string(),
            }),
            Self::RequestModerated | Self::ContentModerated => {
                JobStatus::Moderated(self.label().to_string())
            }
            Self::Pending | Self::Unknown(_) => JobStatus::Pending,
        }
    }
}

/// Interpret a polling response body; a missing or non-string status is pending
pub fn parse_poll_body(body: &Value) -> JobStatus {
    match body.get("status").and_then(Value::as_str) {
        Some(status) => {
            BflStatus::parse(status).normalize(body.get("result").cloned(), failure_detail(body))
        }
        None => JobStatus::Pending,
    }
}

/// Vendor diagnosis from `error` or `details`, rendered as text
fn failure_detail(body: &Value) -> Option<String> {
    ["error", "details"]
        .iter()
        .filter_map(|field| body.get(*field))
        .find_map(|value| match value {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        })
}

/// HTTP client for the BFL API
pub struct BflClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl BflClient {
    pub fn new(config: &BflConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_ms)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        require_key(&self.api_key, PROVIDER).is_ok()
    }

    /// Submit a Kontext generation and return its polling handle
    pub async fn submit(&self, model: KontextModel, request: &KontextRequest) -> Result<BflSubmission> {
        debug!(model = model.as_str(), has_input_image = request.input_image.is_some(), "Submitting Kontext request");
        self.submit_to(model.as_str(), request).await
    }

    /// Submit an inpainting task to the plain or finetuned fill endpoint
    pub async fn submit_fill(&self, request: &FillRequest) -> Result<BflSubmission> {
        debug!(endpoint = request.endpoint(), steps = request.steps, "Submitting fill request");
        self.submit_to(request.endpoint(), request).await
    }

    async fn submit_to<T: Serialize + ?Sized>(&self, endpoint: &str, request: &T) -> Result<BflSubmission> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header("x-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, endpoint, "BFL submission rejected");
            return Err(AppError::Upstream {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let submitted: SubmitResponse = response.json().await?;
        let polling_url = submitted
            .polling_url
            .ok_or_else(|| AppError::BackendError("No polling URL received from BFL API".to_string()))?;
        let id = submitted
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        debug!(job_id = %id, polling_url = %polling_url, endpoint, "BFL request accepted");
        Ok(BflSubmission { id, polling_url })
    }

    /// One-shot status lookup by task id against `get_result`
    pub async fn get_result(&self, id: &str) -> Result<Value> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let response = self
            .client
            .get(format!("{}/get_result", self.base_url))
            .query(&[("id", id)])
            .header("x-key", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatusSource for BflClient {
    fn name(&self) -> &str {
        "bfl"
    }

    async fn check(&self, handle: &str) -> Result<JobStatus> {
        let api_key = require_key(&self.api_key, PROVIDER)?;
        let response = self.client.get(handle).header("x-key", api_key).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BackendError(format!("Polling returned {}", status)));
        }

        let body: Value = response.json().await?;
        Ok(parse_poll_body(&body))
    }
}
