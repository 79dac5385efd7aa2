//! HTTP API - axum router and request handlers

pub mod health;
pub mod images;
pub mod inpaint;
pub mod jobs;
pub mod music;
pub mod proxy;
pub mod routes;
pub mod uploads;
pub mod videos;

pub use routes::create_router;

use crate::error::{AppError, Result};
use crate::storage::{ArtifactKind, PersistedArtifact};
use crate::AppState;

/// Copy a vendor artifact into storage, or relay its URL when storage is off
pub(crate) async fn persist_artifact(
    state: &AppState,
    source_url: &str,
    file_name: &str,
    kind: ArtifactKind,
) -> PersistedArtifact {
    match &state.persister {
        Some(persister) => persister.persist_or_fallback(source_url, file_name, kind).await,
        None => PersistedArtifact::passthrough(source_url),
    }
}

/// Reject a missing or blank required string field
pub(crate) fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidRequest(message.to_string()))
}

/// First `max` characters of a string, for log fields and echoed metadata
pub(crate) fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
