//! Flux Fill inpainting endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::api::images::{generate_image, validate_safety_tolerance, BflTask};
use crate::api::{preview, required};
use crate::error::{AppError, Result};
use crate::provider::FillRequest;
use crate::AppState;

const MAX_PROMPT_CHARS: usize = 500;

const GUIDANCE_RANGE: std::ops::RangeInclusive<f64> = 1.5..=100.0;

const FINETUNE_STRENGTH_RANGE: std::ops::RangeInclusive<f64> = 0.0..=2.0;

fn default_steps() -> i64 {
    50
}

fn default_output_format() -> String {
    "jpeg".to_string()
}

fn default_safety_tolerance() -> i64 {
    2
}

#[derive(Debug, Deserialize)]
pub struct InpaintRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub use_finetune: bool,
    #[serde(default)]
    pub finetune_id: Option<String>,
    #[serde(default)]
    pub finetune_strength: Option<f64>,
    #[serde(default = "default_steps")]
    pub steps: i64,
    #[serde(default)]
    pub prompt_upsampling: bool,
    #[serde(default)]
    pub seed: Option<i64>,
    /// Defaults depend on whether a finetune is used
    #[serde(default)]
    pub guidance: Option<f64>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_safety_tolerance")]
    pub safety_tolerance: i64,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InpaintResponse {
    pub success: bool,
    pub id: String,
    pub polling_url: String,
    pub message: String,
    pub image_url: String,
    pub original_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    pub timestamp: String,
    pub metadata: InpaintMetadata,
}

#[derive(Debug, Serialize)]
pub struct InpaintMetadata {
    pub endpoint: String,
    pub prompt: String,
    pub finetuned: bool,
    pub steps: u32,
    pub guidance: f64,
    pub stored_permanently: bool,
    pub poll_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InpaintStatusQuery {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InpaintStatusResponse {
    pub id: String,
    pub status: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drop a `data:<mime>;base64,` prefix, leaving the bare payload
pub fn strip_data_url(data: &str) -> &str {
    match data.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    }
}

/// Validate an inpainting body and build the vendor request
pub fn build_fill_request(body: InpaintRequest) -> Result<FillRequest> {
    let missing = || AppError::InvalidRequest("Missing required fields: image, mask, or prompt".to_string());
    let image = required(&body.image, "").map_err(|_| missing())?;
    let mask = required(&body.mask, "").map_err(|_| missing())?;
    let prompt = body.prompt.as_deref().ok_or_else(missing)?;

    let prompt_chars = prompt.chars().count();
    if prompt_chars == 0 || prompt_chars > MAX_PROMPT_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Prompt must be between 1-{} characters",
            MAX_PROMPT_CHARS
        )));
    }

    let finetune_id = if body.use_finetune {
        let id = required(&body.finetune_id, "Finetune ID is required when using finetune API")?;
        Some(id.to_string())
    } else {
        None
    };

    let steps = u32::try_from(body.steps)
        .ok()
        .filter(|s| (15..=50).contains(s))
        .ok_or_else(|| AppError::InvalidRequest("Steps must be between 15 and 50".to_string()))?;

    let guidance = body
        .guidance
        .unwrap_or(if finetune_id.is_some() { 60.0 } else { 50.75 });
    if !GUIDANCE_RANGE.contains(&guidance) {
        return Err(AppError::InvalidRequest(
            "Guidance must be between 1.5 and 100".to_string(),
        ));
    }

    let finetune_strength = match &finetune_id {
        Some(_) => {
            let strength = body.finetune_strength.unwrap_or(1.1);
            if !FINETUNE_STRENGTH_RANGE.contains(&strength) {
                return Err(AppError::InvalidRequest(
                    "Finetune strength must be between 0 and 2".to_string(),
                ));
            }
            Some(strength)
        }
        None => None,
    };

    let output_format = match body.output_format.as_str() {
        "jpeg" | "png" => body.output_format.clone(),
        _ => {
            return Err(AppError::InvalidRequest(
                "Output format must be jpeg or png".to_string(),
            ))
        }
    };

    Ok(FillRequest {
        image: strip_data_url(image).to_string(),
        mask: strip_data_url(mask).to_string(),
        prompt: prompt.to_string(),
        steps,
        prompt_upsampling: body.prompt_upsampling,
        seed: body.seed,
        guidance,
        output_format,
        safety_tolerance: validate_safety_tolerance(body.safety_tolerance)?,
        finetune_id,
        finetune_strength,
        webhook_url: body.webhook_url.filter(|u| !u.is_empty()),
        webhook_secret: body.webhook_secret.filter(|s| !s.is_empty()),
    })
}

/// POST /v1/images/inpaint
pub async fn inpaint(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InpaintRequest>,
) -> Result<Json<InpaintResponse>> {
    let request = build_fill_request(body)?;
    let endpoint = request.endpoint().to_string();
    let prompt = request.prompt.clone();
    let finetuned = request.finetune_id.is_some();
    let (steps, guidance) = (request.steps, request.guidance);

    info!(endpoint = %endpoint, steps, guidance, "Inpainting requested");

    let image = generate_image(&state, BflTask::Fill(request), &format!("inpaint_{}", prompt)).await?;

    Ok(Json(InpaintResponse {
        success: true,
        id: image.id,
        polling_url: image.polling_url,
        message: "Inpainting completed".to_string(),
        image_url: image.image_url,
        original_image_url: image.original_image_url,
        storage_path: image.storage_path.clone(),
        timestamp: Utc::now().to_rfc3339(),
        metadata: InpaintMetadata {
            endpoint,
            prompt: preview(&prompt, 100),
            finetuned,
            steps,
            guidance,
            stored_permanently: image.storage_path.is_some(),
            poll_attempts: image.attempts,
            storage_warning: image.storage_warning,
        },
    }))
}

/// GET /v1/images/inpaint?id=
///
/// One status lookup against the vendor, relayed as-is.
pub async fn inpaint_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InpaintStatusQuery>,
) -> Result<Json<InpaintStatusResponse>> {
    let id = required(&query.id, "Task ID is required")?.to_string();
    let body = state.bfl.get_result(&id).await?;

    let error = ["error", "details"]
        .iter()
        .filter_map(|field| body.get(*field))
        .find_map(|value| match value {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        });

    Ok(Json(InpaintStatusResponse {
        id,
        status: body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("Pending")
            .to_string(),
        result: body.get("result").cloned().unwrap_or(Value::Null),
        error,
    }))
}
