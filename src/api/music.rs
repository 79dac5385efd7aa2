//! MiniMax music generation endpoint

use axum::{extract::State, Json};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::jobs::{Job, JobKind, JobState};
use crate::provider::minimax::AudioSetting;
use crate::provider::MusicRequest;
use crate::AppState;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn default_music_model() -> String {
    "music-1.5".to_string()
}

#[derive(Debug, Deserialize)]
pub struct MusicGenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default = "default_music_model")]
    pub model: String,
    #[serde(default)]
    pub audio_setting: Option<AudioSetting>,
}

#[derive(Debug, Serialize)]
pub struct MusicGenerateResponse {
    pub status: &'static str,
    /// Hex-encoded audio
    pub audio_data: String,
    pub audio_format: String,
    pub trace_id: String,
    pub message: String,
}

/// `<millis>-<9 base36 chars>`
pub fn trace_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Check prompt and lyrics lengths, counted in characters
pub fn validate_music_input(prompt: Option<&str>, lyrics: Option<&str>) -> Result<()> {
    let (prompt, lyrics) = match (prompt, lyrics) {
        (Some(p), Some(l)) if !p.is_empty() && !l.is_empty() => (p, l),
        _ => return Err(AppError::InvalidRequest("Prompt and lyrics are required".to_string())),
    };

    if !(10..=300).contains(&prompt.chars().count()) {
        return Err(AppError::InvalidRequest(
            "Prompt must be between 10-300 characters".to_string(),
        ));
    }
    if !(10..=600).contains(&lyrics.chars().count()) {
        return Err(AppError::InvalidRequest(
            "Lyrics must be between 10-600 characters".to_string(),
        ));
    }
    Ok(())
}

/// POST /v1/music
pub async fn generate_music(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MusicGenerateRequest>,
) -> Result<Json<MusicGenerateResponse>> {
    validate_music_input(body.prompt.as_deref(), body.lyrics.as_deref())?;

    let request = MusicRequest {
        model: body.model,
        prompt: body.prompt.unwrap_or_default(),
        lyrics: body.lyrics.unwrap_or_default(),
        audio_setting: body.audio_setting.unwrap_or_default(),
    };

    let trace_id = trace_id();
    let mut job = Job::new(&trace_id, JobKind::Music, &trace_id);
    let _guard = state.jobs.track(job.clone());
    info!(trace_id = %trace_id, model = %request.model, "Music generation requested");

    let minimax = state.minimax.clone();
    let outcome = state
        .queue
        .enqueue(move || async move { minimax.generate_music(&request).await })
        .await;

    match outcome {
        Ok(output) => {
            job.complete(None);
            state.jobs.record(&job);
            info!(trace_id = %trace_id, bytes = output.audio_hex.len() / 2, "Music generated");
            Ok(Json(MusicGenerateResponse {
                status: "completed",
                audio_data: output.audio_hex,
                audio_format: output.format,
                trace_id,
                message: "Music generated successfully".to_string(),
            }))
        }
        Err(e) => {
            job.transition(JobState::Failed, Some(e.to_string()));
            state.jobs.record(&job);
            error!(trace_id = %trace_id, error = %e, "Music generation failed");
            Err(e)
        }
    }
}
