//! Firebase Storage backend using the REST upload endpoint

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FirebaseConfig;
use crate::error::{AppError, Result};
use crate::storage::{ObjectStore, StorageError, StorageErrorKind, UploadObject};

/// Object store writing into a Firebase Storage bucket
pub struct FirebaseObjectStore {
    client: Client,
    base_url: Url,
    bucket: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "downloadTokens")]
    download_tokens: Option<String>,
}

impl FirebaseObjectStore {
    pub fn new(config: &FirebaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AppError::Internal(format!("Invalid Firebase base URL: {}", config.base_url)))?;

        Ok(Self {
            client,
            base_url,
            bucket: config.bucket.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// `base_url` extended by `segments`, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// The object name becomes a single segment, so its slashes are encoded
    fn object_url(&self, path: &str) -> Url {
        self.endpoint(&["v0", "b", self.bucket.as_str(), "o", path])
    }

    /// Public download URL for an object
    pub fn download_url(&self, path: &str, token: Option<&str>) -> String {
        let mut url = self.object_url(path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        url.to_string()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Attach custom metadata; the object is already usable if this fails
    async fn patch_metadata(&self, path: &str, object: &UploadObject) {
        if object.metadata.is_empty() {
            return;
        }

        let body = serde_json::json!({
            "contentType": object.content_type,
            "metadata": object.metadata,
        });

        let request = self.authorize(self.client.patch(self.object_url(path)).json(&body));
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(path = %path, "Stored artifact metadata");
            }
            Ok(response) => {
                warn!(path = %path, status = %response.status(), "Metadata update rejected");
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Metadata update failed");
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FirebaseObjectStore {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn put(&self, path: &str, object: UploadObject) -> std::result::Result<String, StorageError> {
        let url = self.endpoint(&["v0", "b", self.bucket.as_str(), "o"]);
        let request = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(reqwest::header::CONTENT_TYPE, object.content_type.as_str())
            .body(object.data.clone());

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StorageError::unknown(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = StorageErrorKind::from_status(status.as_u16(), &body);
            return Err(StorageError::new(
                kind,
                format!("Firebase Storage returned {}: {}", status, body),
            ));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::unknown(format!("Unreadable upload response: {}", e)))?;

        let stored_name = uploaded.name.as_deref().unwrap_or(path);
        let token = uploaded
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty());

        self.patch_metadata(stored_name, &object).await;

        debug!(path = %stored_name, size = object.data.len(), "Uploaded artifact to Firebase Storage");
        Ok(self.download_url(stored_name, token))
    }
}
