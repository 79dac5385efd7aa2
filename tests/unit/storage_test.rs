//! Unit tests for object stores and storage diagnostics

use axum::http::StatusCode;
use gen_job_gateway::config::StorageConfig;
use gen_job_gateway::storage::local::LocalObjectStore;
use gen_job_gateway::storage::persister::StorageFolders;
use gen_job_gateway::storage::{
    base64, create_store, ArtifactKind, ArtifactPersister, ObjectStore, StorageError,
    StorageErrorKind, UploadObject,
};
use gen_job_gateway::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn local_persister(dir: &TempDir) -> (Arc<LocalObjectStore>, ArtifactPersister) {
    let store = Arc::new(LocalObjectStore::new(
        dir.path().to_string_lossy().to_string(),
        "http://localhost:8080/files".to_string(),
    ));
    let folders = StorageFolders {
        images: "generated-images".to_string(),
        videos: "generated-videos".to_string(),
        uploads: "reference-images".to_string(),
    };
    let persister = ArtifactPersister::new(store.clone(), folders).unwrap();
    (store, persister)
}

#[test]
fn test_storage_config_defaults() {
    let config = StorageConfig::default();

    assert!(config.enabled);
    assert_eq!(config.backend, "local");
    assert_eq!(config.image_folder, "generated-images");
    assert_eq!(config.video_folder, "generated-videos");
    assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
}

#[test]
fn test_create_store_by_backend_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StorageConfig {
        base_path: dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    assert_eq!(create_store(&config).unwrap().name(), "local");

    config.backend = "firebase".to_string();
    config.firebase.bucket = "demo.appspot.com".to_string();
    assert_eq!(create_store(&config).unwrap().name(), "firebase");

    config.backend = "s3".to_string();
    assert!(create_store(&config).is_err());
}

#[test]
fn test_storage_paths_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let (_, persister) = local_persister(&dir);

    let first = persister.storage_path(ArtifactKind::Image, "ring shot.png");
    let second = persister.storage_path(ArtifactKind::Image, "ring shot.png");

    assert_ne!(first, second);
    assert!(first.starts_with("generated-images/"));
    assert!(first.ends_with("_ring_shot.png"));
    assert!(persister
        .storage_path(ArtifactKind::Video, "v.mp4")
        .starts_with("generated-videos/"));
}

#[tokio::test]
async fn test_store_bytes_writes_under_folder() {
    let dir = tempfile::tempdir().unwrap();
    let (store, persister) = local_persister(&dir);

    let stored = persister
        .store_bytes(
            b"reference".to_vec(),
            "ref.png",
            ArtifactKind::Upload,
            "image/png".to_string(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    assert!(stored.storage_path.starts_with("reference-images/"));
    assert_eq!(
        stored.permanent_url,
        format!("http://localhost:8080/files/{}", stored.storage_path)
    );
    assert_eq!(stored.size, 9);
    assert_eq!(store.read(&stored.storage_path).await.unwrap(), b"reference");
}

#[tokio::test]
async fn test_local_store_unwritable_root_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root_file = dir.path().join("not-a-directory");
    std::fs::write(&root_file, b"file").unwrap();

    // The root is a regular file, so nothing can be created beneath it
    let store = LocalObjectStore::new(
        root_file.to_string_lossy().to_string(),
        "http://localhost/files".to_string(),
    );
    let object = UploadObject {
        data: b"x".to_vec(),
        content_type: "image/png".to_string(),
        metadata: BTreeMap::new(),
    };

    assert!(store.put("generated-images/1_x.png", object).await.is_err());
}

#[test]
fn test_storage_error_response_carries_diagnostic_code() {
    let error: AppError = StorageError::new(StorageErrorKind::QuotaExceeded, "bucket full").into();

    assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(error.to_string(), "Storage error: bucket full");
    assert_eq!(StorageErrorKind::QuotaExceeded.code(), "storage_quota_exceeded");
}

#[test]
fn test_io_error_classification() {
    let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
    let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
    let other = std::io::Error::from(std::io::ErrorKind::Other);

    assert_eq!(StorageErrorKind::from_io(&denied), StorageErrorKind::Unauthorized);
    assert_eq!(StorageErrorKind::from_io(&missing), StorageErrorKind::BucketNotFound);
    assert_eq!(StorageErrorKind::from_io(&other), StorageErrorKind::Unknown);
}

#[test]
fn test_base64_round_trip_for_uploads() {
    let encoded = format!("data:image/webp;base64,{}", base64::encode(b"RIFF0000WEBP"));
    let upload = base64::decode_upload(&encoded).unwrap();

    assert_eq!(upload.data, b"RIFF0000WEBP");
    assert_eq!(upload.declared_type.as_deref(), Some("image/webp"));
}
