//! Filesystem-backed object store, served back by the gateway under `/files`

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::storage::{ObjectStore, StorageError, StorageErrorKind, UploadObject};

/// Object store writing under a local root directory
pub struct LocalObjectStore {
    storage_path: PathBuf,
    url_prefix: String,
}

impl LocalObjectStore {
    /// Create a new local store
    pub fn new(storage_path: String, url_prefix: String) -> Self {
        Self {
            storage_path: PathBuf::from(storage_path),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.storage_path
    }

    /// Resolve a storage path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || path.is_empty() {
            return Err(StorageError::unknown(format!("Invalid storage path: {}", path)));
        }
        Ok(self.storage_path.join(relative))
    }

    /// Read an object back
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let file_path = self.resolve(path)?;
        fs::read(&file_path)
            .await
            .map_err(|e| StorageError::new(StorageErrorKind::from_io(&e), e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, path: &str, object: UploadObject) -> Result<String, StorageError> {
        let file_path = self.resolve(path)?;
        let io_error = |e: std::io::Error| StorageError::new(StorageErrorKind::from_io(&e), e.to_string());

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        fs::write(&file_path, &object.data).await.map_err(io_error)?;

        debug!(
            path = ?file_path,
            size = object.data.len(),
            content_type = %object.content_type,
            "Saved artifact file"
        );

        Ok(format!("{}/{}", self.url_prefix, path))
    }
}
