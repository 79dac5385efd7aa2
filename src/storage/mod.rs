//! Storage module - durable object storage for generated artifacts

pub mod base64;
pub mod firebase;
pub mod local;
pub mod persister;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

pub use persister::{ArtifactKind, ArtifactPersister, PersistedArtifact, StoredArtifact};

/// Diagnostic category of a storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Unauthorized,
    QuotaExceeded,
    BucketNotFound,
    Unknown,
}

impl StorageErrorKind {
    /// Classify an HTTP status (and body) returned by a storage service
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.to_lowercase();
        if body.contains("quota") || status == 429 || status == 507 {
            return Self::QuotaExceeded;
        }
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::BucketNotFound,
            _ => Self::Unknown,
        }
    }

    /// Classify a local filesystem error
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Unauthorized,
            std::io::ErrorKind::NotFound => Self::BucketNotFound,
            _ => match error.raw_os_error() {
                // ENOSPC / EDQUOT
                Some(28) | Some(122) => Self::QuotaExceeded,
                _ => Self::Unknown,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "storage_unauthorized",
            Self::QuotaExceeded => "storage_quota_exceeded",
            Self::BucketNotFound => "storage_bucket_not_found",
            Self::Unknown => "storage_unknown",
        }
    }

    /// Human-readable hint for operators
    pub fn diagnostic(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized access. Check the storage credentials and access rules.",
            Self::QuotaExceeded => "Storage quota exceeded.",
            Self::BucketNotFound => "Bucket not found. Check the configured bucket or storage root.",
            Self::Unknown => "Unknown storage error. Check the storage configuration.",
        }
    }
}

/// Failure while copying an artifact into storage
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unknown, message)
    }
}

/// Bytes and metadata to upload
#[derive(Debug, Clone)]
pub struct UploadObject {
    pub data: Vec<u8>,
    pub content_type: String,
    /// Custom key/value tags stored next to the object
    pub metadata: BTreeMap<String, String>,
}

/// A durable object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Upload `object` under `path` and return its public URL
    async fn put(&self, path: &str, object: UploadObject) -> std::result::Result<String, StorageError>;
}

/// Build the configured object store
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend.as_str() {
        "local" => Ok(Arc::new(local::LocalObjectStore::new(
            config.base_path.clone(),
            config.url_prefix.clone(),
        ))),
        "firebase" => Ok(Arc::new(firebase::FirebaseObjectStore::new(&config.firebase)?)),
        other => Err(AppError::Internal(format!("Unknown storage backend: {}", other))),
    }
}

/// Replace everything outside `[a-zA-Z0-9.-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Build a descriptive file name from a prompt-like label and a model id
pub fn artifact_file_name(label: &str, model: &str, extension: &str) -> String {
    let mut slug = String::new();
    let mut pending_sep = false;
    for c in label.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '_' {
            pending_sep = true;
        }
    }
    let slug: String = slug.chars().take(50).collect();

    let model_slug = model.trim_start_matches("flux-").replace('-', "_");
    format!("{}_{}.{}", model_slug, slug, extension)
}

/// Detect an image MIME type from magic bytes
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    None
}

/// File extension for a MIME type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or_default().trim() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" => "wav",
        _ => "png",
    }
}
