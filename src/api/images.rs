//! Flux Kontext image generation endpoints

use axum::{extract::State, Json};
use chrono::Utc;
use futures::future::try_join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{persist_artifact, preview, required};
use crate::error::{AppError, Result};
use crate::jobs::{Job, JobKind};
use crate::provider::{FillRequest, KontextModel, KontextRequest};
use crate::storage::{artifact_file_name, ArtifactKind};
use crate::AppState;

const MODEL_SHOT_KEYWORDS: [&str; 4] = ["portrait", "wearing", "elegant", "lifestyle"];

const REFERENCE_INSTRUCTION: &str = "IMPORTANT: The model should be wearing jewelry identical to the reference jewelry image provided. Ensure the jewelry details, materials, colors, and design elements match exactly the jewelry shown in the reference.";

fn default_model() -> String {
    KontextModel::Pro.as_str().to_string()
}

fn default_output_format() -> String {
    "png".to_string()
}

fn default_safety_tolerance() -> i64 {
    2
}

fn default_studio_aspect_ratio() -> Option<String> {
    Some("1:1".to_string())
}

fn default_true() -> bool {
    true
}

fn default_num_images() -> i64 {
    1
}

/// Upper bound on images generated by one Kontext request
pub const MAX_IMAGES_PER_REQUEST: u8 = 4;

#[derive(Debug, Deserialize)]
pub struct KontextGenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub input_image: Option<String>,
    /// Portrait reference used instead of `input_image` for model shots
    #[serde(default)]
    pub model_reference_image: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default)]
    pub prompt_upsampling: bool,
    #[serde(default = "default_safety_tolerance")]
    pub safety_tolerance: i64,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_num_images")]
    pub num_images: i64,
}

#[derive(Debug, Serialize)]
pub struct KontextGenerateResponse {
    pub success: bool,
    pub id: String,
    pub polling_url: String,
    pub image_url: String,
    pub original_image_url: String,
    /// Every generated image, first one included
    pub image_urls: Vec<String>,
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    pub timestamp: String,
    pub metadata: KontextMetadata,
}

#[derive(Debug, Serialize)]
pub struct KontextMetadata {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    pub has_input_image: bool,
    pub count: usize,
    pub stored_permanently: bool,
    pub poll_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StudioRequest {
    #[serde(default)]
    pub prompts: Option<Vec<ShotPrompt>>,
    #[serde(default)]
    pub input_image: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_studio_aspect_ratio")]
    pub aspect_ratio: Option<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_true")]
    pub prompt_upsampling: bool,
    #[serde(default = "default_safety_tolerance")]
    pub safety_tolerance: i64,
}

/// One shot of a studio batch
#[derive(Debug, Clone, Deserialize)]
pub struct ShotPrompt {
    #[serde(default)]
    pub id: Value,
    #[serde(default = "default_shot_type", rename = "type")]
    pub shot_type: String,
    pub prompt: String,
}

fn default_shot_type() -> String {
    "shot".to_string()
}

#[derive(Debug, Serialize)]
pub struct ShotResult {
    pub id: Value,
    #[serde(rename = "type")]
    pub shot_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudioResponse {
    pub success: bool,
    pub results: Vec<ShotResult>,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub timestamp: String,
}

/// A generated and persisted image
pub(crate) struct GeneratedImage {
    pub id: String,
    pub polling_url: String,
    pub image_url: String,
    pub original_image_url: String,
    pub storage_path: Option<String>,
    pub storage_warning: Option<String>,
    pub attempts: u32,
}

/// A BFL submission of either flavour
pub(crate) enum BflTask {
    Kontext(KontextModel, KontextRequest),
    Fill(FillRequest),
}

impl BflTask {
    fn model_name(&self) -> &'static str {
        match self {
            Self::Kontext(model, _) => model.as_str(),
            Self::Fill(request) => request.endpoint(),
        }
    }

    fn output_format(&self) -> &str {
        match self {
            Self::Kontext(_, request) => &request.output_format,
            Self::Fill(request) => &request.output_format,
        }
    }
}

/// Check the requested image count is within 1 and [`MAX_IMAGES_PER_REQUEST`]
pub fn validate_num_images(value: i64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|n| (1..=MAX_IMAGES_PER_REQUEST).contains(n))
        .ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "Number of images must be between 1 and {}",
                MAX_IMAGES_PER_REQUEST
            ))
        })
}

/// Seeds for a fan-out of `count` images.
///
/// A single image keeps the caller's seed. Extra images step from it, or get
/// random seeds when none was given, so the variants differ.
pub fn fan_out_seeds(seed: Option<i64>, count: u8) -> Vec<Option<i64>> {
    if count <= 1 {
        return vec![seed];
    }
    let mut rng = rand::thread_rng();
    (0..i64::from(count))
        .map(|offset| match seed {
            Some(seed) => Some(seed.wrapping_add(offset)),
            None => Some(rng.gen_range(1..=i64::from(i32::MAX))),
        })
        .collect()
}

/// Check a safety tolerance is within the vendor's 0-6 scale
pub fn validate_safety_tolerance(value: i64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 6)
        .ok_or_else(|| AppError::InvalidRequest("Safety tolerance must be between 0 and 6".to_string()))
}

/// Check an aspect ratio is `W:H` with positive integers.
///
/// Ratios outside 21:9 to 9:21 are accepted with a warning.
pub fn validate_aspect_ratio(aspect_ratio: &str) -> Result<()> {
    let (width, height) = aspect_ratio
        .split_once(':')
        .filter(|(w, h)| {
            !w.is_empty()
                && !h.is_empty()
                && w.bytes().all(|b| b.is_ascii_digit())
                && h.bytes().all(|b| b.is_ascii_digit())
        })
        .ok_or_else(|| {
            AppError::InvalidRequest(
                "Invalid aspect ratio format. Must be in format \"width:height\"".to_string(),
            )
        })?;

    let invalid_values = || {
        AppError::InvalidRequest(
            "Invalid aspect ratio values. Width and height must be positive numbers".to_string(),
        )
    };
    let width: f64 = width.parse().map_err(|_| invalid_values())?;
    let height: f64 = height.parse().map_err(|_| invalid_values())?;
    if width <= 0.0 || height <= 0.0 {
        return Err(invalid_values());
    }

    let ratio = width / height;
    if ratio < 9.0 / 21.0 || ratio > 21.0 / 9.0 {
        warn!(aspect_ratio = %aspect_ratio, "Aspect ratio outside the recommended 21:9 to 9:21 range; using anyway");
    }
    Ok(())
}

/// Whether a prompt asks for a person modelling the product
pub fn is_model_shot(prompt: &str) -> bool {
    let prompt = prompt.to_lowercase();
    prompt.contains("model") && MODEL_SHOT_KEYWORDS.iter().any(|k| prompt.contains(k))
}

/// Pick the primary input image and the prompt to send
pub fn select_primary_input(
    prompt: &str,
    input_image: Option<String>,
    model_reference_image: Option<String>,
) -> (Option<String>, String) {
    match model_reference_image {
        Some(reference) if is_model_shot(prompt) => {
            info!("Using model reference as primary input for model shot");
            (Some(reference), format!("{}\n\n{}", prompt, REFERENCE_INSTRUCTION))
        }
        _ => (input_image, prompt.to_string()),
    }
}

fn extension_for_format(output_format: &str) -> &str {
    match output_format {
        "jpeg" | "jpg" => "jpg",
        "webp" => "webp",
        _ => "png",
    }
}

/// Submit through the queue, poll to completion and persist the image.
///
/// The job stays registered while this runs; once it finishes its terminal
/// snapshot, pointing at the persisted URL, is left for `GET /v1/jobs/:id`.
pub(crate) async fn generate_image(state: &Arc<AppState>, task: BflTask, label: &str) -> Result<GeneratedImage> {
    let extension = extension_for_format(task.output_format()).to_string();
    let model_name = task.model_name();

    let bfl = state.bfl.clone();
    let submission = state
        .queue
        .enqueue(move || async move {
            match task {
                BflTask::Kontext(model, request) => bfl.submit(model, &request).await,
                BflTask::Fill(request) => bfl.submit_fill(&request).await,
            }
        })
        .await?;

    let mut job = Job::new(&submission.id, JobKind::Image, &submission.polling_url);
    let _guard = state.jobs.track(job.clone());
    let outcome = state.poller.poll(state.bfl.as_ref(), &mut job).await;

    let result = outcome.into_result()?;
    let original_image_url = result
        .url
        .ok_or_else(|| AppError::BackendError("No image generated by BFL API".to_string()))?;

    let file_name = artifact_file_name(label, model_name, &extension);
    let persisted = persist_artifact(state, &original_image_url, &file_name, ArtifactKind::Image).await;
    job.result = Some(persisted.url.clone());
    state.jobs.record(&job);

    Ok(GeneratedImage {
        id: submission.id,
        polling_url: submission.polling_url,
        image_url: persisted.url,
        original_image_url,
        storage_path: persisted.storage_path,
        storage_warning: persisted.degraded,
        attempts: job.attempts,
    })
}

/// POST /v1/images/kontext
pub async fn generate_kontext(
    State(state): State<Arc<AppState>>,
    Json(body): Json<KontextGenerateRequest>,
) -> Result<Json<KontextGenerateResponse>> {
    let prompt = required(&body.prompt, "Prompt is required")?.to_string();
    let safety_tolerance = validate_safety_tolerance(body.safety_tolerance)?;
    if let Some(aspect_ratio) = &body.aspect_ratio {
        validate_aspect_ratio(aspect_ratio)?;
    }
    let count = validate_num_images(body.num_images)?;

    let model = KontextModel::from_name(&body.model);
    let (input_image, enhanced_prompt) =
        select_primary_input(&prompt, body.input_image, body.model_reference_image);

    info!(
        model = model.as_str(),
        has_input_image = input_image.is_some(),
        aspect_ratio = ?body.aspect_ratio,
        count,
        "Kontext generation requested"
    );

    let request = KontextRequest {
        prompt: enhanced_prompt.clone(),
        input_image,
        seed: None,
        aspect_ratio: body.aspect_ratio.clone(),
        output_format: body.output_format,
        prompt_upsampling: body.prompt_upsampling,
        safety_tolerance,
        webhook_url: body.webhook_url.filter(|u| !u.is_empty()),
        webhook_secret: body.webhook_secret.filter(|s| !s.is_empty()),
    };
    let has_input_image = request.input_image.is_some();

    let seeds = fan_out_seeds(body.seed.filter(|s| *s != 0), count);
    let generations = seeds.into_iter().map(|seed| {
        let request = KontextRequest {
            seed,
            ..request.clone()
        };
        generate_image(&state, BflTask::Kontext(model, request), &prompt)
    });
    let mut images = try_join_all(generations).await?.into_iter();
    let first = images
        .next()
        .ok_or_else(|| AppError::Internal("No image requested".to_string()))?;
    let rest: Vec<GeneratedImage> = images.collect();

    let mut image_urls = vec![first.image_url.clone()];
    image_urls.extend(rest.iter().map(|image| image.image_url.clone()));
    let mut ids = vec![first.id.clone()];
    ids.extend(rest.iter().map(|image| image.id.clone()));

    Ok(Json(KontextGenerateResponse {
        success: true,
        id: first.id,
        polling_url: first.polling_url,
        image_url: first.image_url,
        original_image_url: first.original_image_url,
        image_urls,
        ids,
        storage_path: first.storage_path.clone(),
        timestamp: Utc::now().to_rfc3339(),
        metadata: KontextMetadata {
            model: model.as_str().to_string(),
            prompt: preview(&enhanced_prompt, 100),
            aspect_ratio: body.aspect_ratio,
            has_input_image,
            count: usize::from(count),
            stored_permanently: first.storage_path.is_some()
                && rest.iter().all(|image| image.storage_path.is_some()),
            poll_attempts: first.attempts,
            storage_warning: first.storage_warning,
        },
    }))
}

/// POST /v1/images/studio
///
/// Every shot goes through the submission queue; a failed shot is reported
/// in its own result and does not fail the batch.
pub async fn generate_studio(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StudioRequest>,
) -> Result<Json<StudioResponse>> {
    let prompts = body
        .prompts
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Prompts array is required".to_string()))?;
    let input_image = required(&body.input_image, "Input image is required")?.to_string();
    let safety_tolerance = validate_safety_tolerance(body.safety_tolerance)?;
    if let Some(aspect_ratio) = &body.aspect_ratio {
        validate_aspect_ratio(aspect_ratio)?;
    }

    let model = KontextModel::from_name(&body.model);
    let total = prompts.len();
    info!(shots = total, model = model.as_str(), "Studio batch requested");

    let mut results = Vec::with_capacity(total);
    for (index, shot) in prompts.into_iter().enumerate() {
        let request = KontextRequest {
            prompt: shot.prompt.clone(),
            input_image: Some(input_image.clone()),
            seed: None,
            aspect_ratio: body.aspect_ratio.clone(),
            output_format: body.output_format.clone(),
            prompt_upsampling: body.prompt_upsampling,
            safety_tolerance,
            webhook_url: None,
            webhook_secret: None,
        };
        let label = format!("{}_{}", shot.shot_type, shot.prompt);

        let result = match generate_image(&state, BflTask::Kontext(model, request), &label).await {
            Ok(image) => {
                info!(shot = index + 1, total, shot_type = %shot.shot_type, "Studio shot generated");
                ShotResult {
                    id: shot.id,
                    shot_type: shot.shot_type,
                    success: true,
                    image_url: Some(image.image_url),
                    original_image_url: Some(image.original_image_url),
                    storage_path: image.storage_path,
                    prompt: Some(preview(&shot.prompt, 100)),
                    error: None,
                }
            }
            Err(e) => {
                warn!(shot = index + 1, total, shot_type = %shot.shot_type, error = %e, "Studio shot failed");
                ShotResult {
                    id: shot.id,
                    shot_type: shot.shot_type,
                    success: false,
                    image_url: None,
                    original_image_url: None,
                    storage_path: None,
                    prompt: Some(preview(&shot.prompt, 100)),
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let successful_requests = results.iter().filter(|r| r.success).count();
    Ok(Json(StudioResponse {
        success: true,
        total_requests: total,
        successful_requests,
        failed_requests: total - successful_requests,
        results,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
