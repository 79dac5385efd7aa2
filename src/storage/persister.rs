//! Copies vendor-delivered artifacts into durable storage
//!
//! Vendor delivery URLs expire; the persister downloads the bytes and
//! re-uploads them under a fresh `<folder>/<timestamp>_<name>` path. Callers
//! that cannot afford a failure use [`ArtifactPersister::persist_or_fallback`]
//! and keep the vendor URL when storage is unavailable.

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::{sanitize_file_name, ObjectStore, StorageError, StorageErrorKind, UploadObject};

/// Category of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Video,
    Upload,
}

impl ArtifactKind {
    fn default_content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Image | ArtifactKind::Upload => "image/png",
            ArtifactKind::Video => "video/mp4",
        }
    }

    fn accept(&self) -> &'static str {
        match self {
            ArtifactKind::Image | ArtifactKind::Upload => "image/*",
            ArtifactKind::Video => "video/*",
        }
    }

    fn source_tag(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "generated-image",
            ArtifactKind::Video => "generated-video",
            ArtifactKind::Upload => "user-upload",
        }
    }
}

/// Permanent copy of an artifact
#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    pub source_url: Option<String>,
    pub storage_path: String,
    pub permanent_url: String,
    pub content_type: String,
    pub size: usize,
}

/// Result of a persistence attempt that never fails the request
#[derive(Debug, Clone, Serialize)]
pub struct PersistedArtifact {
    /// URL to hand to the client
    pub url: String,
    pub storage_path: Option<String>,
    /// Diagnostic when the copy failed and `url` is the vendor's own URL
    pub degraded: Option<String>,
}

impl PersistedArtifact {
    pub fn is_stored(&self) -> bool {
        self.storage_path.is_some()
    }

    /// The vendor URL relayed unchanged
    pub fn passthrough(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage_path: None,
            degraded: None,
        }
    }
}

/// Folder layout for each artifact kind
#[derive(Debug, Clone)]
pub struct StorageFolders {
    pub images: String,
    pub videos: String,
    pub uploads: String,
}

impl StorageFolders {
    fn folder(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Image => &self.images,
            ArtifactKind::Video => &self.videos,
            ArtifactKind::Upload => &self.uploads,
        }
    }
}

impl From<&StorageConfig> for StorageFolders {
    fn from(config: &StorageConfig) -> Self {
        Self {
            images: config.image_folder.clone(),
            videos: config.video_folder.clone(),
            uploads: config.upload_folder.clone(),
        }
    }
}

/// Result persistence adapter
pub struct ArtifactPersister {
    client: Client,
    store: Arc<dyn ObjectStore>,
    folders: StorageFolders,
    last_timestamp: AtomicI64,
}

impl ArtifactPersister {
    pub fn new(store: Arc<dyn ObjectStore>, folders: StorageFolders) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("Mozilla/5.0 (compatible; gen-job-gateway/0.1)")
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            store,
            folders,
            last_timestamp: AtomicI64::new(0),
        })
    }

    /// Build a persister from storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store = crate::storage::create_store(config)?;
        Self::new(store, StorageFolders::from(config))
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Millisecond timestamp, strictly increasing within this process
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_timestamp.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_timestamp.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Storage path for a new object
    pub fn storage_path(&self, kind: ArtifactKind, file_name: &str) -> String {
        format!(
            "{}/{}_{}",
            self.folders.folder(kind),
            self.next_timestamp(),
            sanitize_file_name(file_name)
        )
    }

    /// Download `source_url` and store it permanently
    pub async fn persist(
        &self,
        source_url: &str,
        file_name: &str,
        kind: ArtifactKind,
    ) -> std::result::Result<StoredArtifact, StorageError> {
        debug!(source = %source_url, "Downloading artifact");

        let response = self
            .client
            .get(source_url)
            .header(reqwest::header::ACCEPT, kind.accept())
            .send()
            .await
            .map_err(|e| StorageError::unknown(format!("Unable to download artifact from source: {}", e)))?;

        if !response.status().is_success() {
            return Err(StorageError::unknown(format!(
                "Failed to download artifact: {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(kind.default_content_type())
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| StorageError::unknown(format!("Failed to read artifact body: {}", e)))?
            .to_vec();

        if data.is_empty() {
            return Err(StorageError::unknown("Downloaded artifact is empty"));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("originalUrl".to_string(), source_url.to_string());

        let mut stored = self
            .store_bytes(data, file_name, kind, content_type, metadata)
            .await?;
        stored.source_url = Some(source_url.to_string());
        Ok(stored)
    }

    /// Store bytes that are already in hand
    pub async fn store_bytes(
        &self,
        data: Vec<u8>,
        file_name: &str,
        kind: ArtifactKind,
        content_type: String,
        mut metadata: BTreeMap<String, String>,
    ) -> std::result::Result<StoredArtifact, StorageError> {
        let storage_path = self.storage_path(kind, file_name);
        metadata.insert("uploadedAt".to_string(), Utc::now().to_rfc3339());
        metadata.insert("source".to_string(), kind.source_tag().to_string());

        let size = data.len();
        let object = UploadObject {
            data,
            content_type: content_type.clone(),
            metadata,
        };

        let permanent_url = self.store.put(&storage_path, object).await?;

        info!(
            storage_path = %storage_path,
            store = self.store.name(),
            size,
            "Artifact stored"
        );

        Ok(StoredArtifact {
            source_url: None,
            storage_path,
            permanent_url,
            content_type,
            size,
        })
    }

    /// Persist, falling back to the vendor URL when storage fails
    pub async fn persist_or_fallback(
        &self,
        source_url: &str,
        file_name: &str,
        kind: ArtifactKind,
    ) -> PersistedArtifact {
        match self.persist(source_url, file_name, kind).await {
            Ok(stored) => PersistedArtifact {
                url: stored.permanent_url,
                storage_path: Some(stored.storage_path),
                degraded: None,
            },
            Err(e) => {
                warn!(
                    source = %source_url,
                    kind = ?e.kind,
                    error = %e,
                    "Artifact not persisted; relaying vendor URL"
                );
                PersistedArtifact {
                    url: source_url.to_string(),
                    storage_path: None,
                    degraded: Some(describe(&e)),
                }
            }
        }
    }
}

fn describe(error: &StorageError) -> String {
    match error.kind {
        StorageErrorKind::Unknown => error.message.clone(),
        kind => format!("{} {}", kind.diagnostic(), error.message),
    }
}
