//! Provider module - vendor API clients and their status vocabularies

pub mod bfl;
pub mod minimax;

use reqwest::Client;
use std::time::Duration;

use crate::error::{AppError, Result};

pub use bfl::{BflClient, BflStatus, FillRequest, KontextModel, KontextRequest};
pub use minimax::{MiniMaxClient, MusicRequest, VideoRequest, VideoTaskStatus};

/// Build the HTTP client shared by one vendor's calls
pub(crate) fn http_client(timeout_ms: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Return the API key or a configuration error naming the vendor
pub(crate) fn require_key<'a>(key: &'a Option<String>, provider: &str) -> Result<&'a str> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::ProviderNotConfigured(provider.to_string()))
}
