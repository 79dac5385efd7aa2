//! Functional tests for artifact persistence against fake HTTP services

use gen_job_gateway::config::FirebaseConfig;
use gen_job_gateway::storage::firebase::FirebaseObjectStore;
use gen_job_gateway::storage::local::LocalObjectStore;
use gen_job_gateway::storage::persister::StorageFolders;
use gen_job_gateway::storage::{ArtifactKind, ArtifactPersister, ObjectStore, StorageErrorKind};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "demo-bucket";

fn folders() -> StorageFolders {
    StorageFolders {
        images: "generated-images".to_string(),
        videos: "generated-videos".to_string(),
        uploads: "reference-images".to_string(),
    }
}

fn local_persister(dir: &TempDir) -> (Arc<LocalObjectStore>, ArtifactPersister) {
    let store = Arc::new(LocalObjectStore::new(
        dir.path().to_string_lossy().to_string(),
        "http://gateway.test/files".to_string(),
    ));
    let persister = ArtifactPersister::new(store.clone(), folders()).unwrap();
    (store, persister)
}

fn firebase_persister(server: &MockServer) -> ArtifactPersister {
    let store: Arc<dyn ObjectStore> = Arc::new(
        FirebaseObjectStore::new(&FirebaseConfig {
            bucket: BUCKET.to_string(),
            base_url: server.uri(),
            auth_token: Some("test-token".to_string()),
        })
        .unwrap(),
    );
    ArtifactPersister::new(store, folders()).unwrap()
}

/// Serve `bytes` as a vendor-delivered image at `/delivery/sample.png`
async fn mount_source(server: &MockServer, bytes: &[u8]) -> String {
    Mock::given(method("GET"))
        .and(path("/delivery/sample.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(bytes.to_vec()),
        )
        .mount(server)
        .await;
    format!("{}/delivery/sample.png", server.uri())
}

#[tokio::test]
async fn test_persisted_bytes_are_identical() {
    let source = MockServer::start().await;
    let pixels: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let source_url = mount_source(&source, &pixels).await;

    let dir = tempfile::tempdir().unwrap();
    let (store, persister) = local_persister(&dir);

    let stored = persister
        .persist(&source_url, "ring.png", ArtifactKind::Image)
        .await
        .unwrap();

    assert_eq!(stored.source_url.as_deref(), Some(source_url.as_str()));
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.size, pixels.len());
    assert!(stored.storage_path.starts_with("generated-images/"));
    assert!(stored.permanent_url.ends_with(&stored.storage_path));
    assert_eq!(store.read(&stored.storage_path).await.unwrap(), pixels);
}

#[tokio::test]
async fn test_same_source_twice_gets_two_paths() {
    let source = MockServer::start().await;
    let source_url = mount_source(&source, b"same-bytes").await;

    let dir = tempfile::tempdir().unwrap();
    let (store, persister) = local_persister(&dir);

    let first = persister
        .persist(&source_url, "shot.png", ArtifactKind::Image)
        .await
        .unwrap();
    let second = persister
        .persist(&source_url, "shot.png", ArtifactKind::Image)
        .await
        .unwrap();

    assert_ne!(first.storage_path, second.storage_path);
    assert_ne!(first.permanent_url, second.permanent_url);
    assert_eq!(store.read(&first.storage_path).await.unwrap(), b"same-bytes");
    assert_eq!(store.read(&second.storage_path).await.unwrap(), b"same-bytes");
}

#[tokio::test]
async fn test_missing_content_type_uses_kind_default() {
    let source = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
        .mount(&source)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (_, persister) = local_persister(&dir);

    let stored = persister
        .persist(&format!("{}/video.bin", source.uri()), "video_1.mp4", ArtifactKind::Video)
        .await
        .unwrap();

    assert_eq!(stored.content_type, "video/mp4");
    assert!(stored.storage_path.starts_with("generated-videos/"));
}

#[tokio::test]
async fn test_unreachable_source_falls_back_to_vendor_url() {
    let source = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&source)
        .await;
    let source_url = format!("{}/expired.png", source.uri());

    let dir = tempfile::tempdir().unwrap();
    let (_, persister) = local_persister(&dir);

    let persisted = persister
        .persist_or_fallback(&source_url, "expired.png", ArtifactKind::Image)
        .await;

    assert_eq!(persisted.url, source_url);
    assert!(!persisted.is_stored());
    assert!(persisted.degraded.unwrap().contains("404"));
}

#[tokio::test]
async fn test_firebase_upload_returns_token_url() {
    let server = MockServer::start().await;
    let source_url = mount_source(&server, b"firebase-bytes").await;

    Mock::given(method("POST"))
        .and(path(format!("/v0/b/{}/o", BUCKET)))
        .and(query_param("uploadType", "media"))
        .and(header("content-type", "image/png"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "generated-images/1_ring.png",
            "downloadTokens": "tok-123"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let persister = firebase_persister(&server);
    let stored = persister
        .persist(&source_url, "ring.png", ArtifactKind::Image)
        .await
        .unwrap();

    assert_eq!(
        stored.permanent_url,
        format!(
            "{}/v0/b/{}/o/generated-images%2F1_ring.png?alt=media&token=tok-123",
            server.uri(),
            BUCKET
        )
    );

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| r.body == b"firebase-bytes"));
}

#[tokio::test]
async fn test_firebase_rejections_are_classified() {
    let cases = [
        (403, "Permission denied.", StorageErrorKind::Unauthorized),
        (404, "The specified bucket does not exist.", StorageErrorKind::BucketNotFound),
        (429, "Too many requests", StorageErrorKind::QuotaExceeded),
        (500, "backend error", StorageErrorKind::Unknown),
    ];

    for (status, body, expected) in cases {
        let server = MockServer::start().await;
        let source_url = mount_source(&server, b"bytes").await;
        Mock::given(method("POST"))
            .and(path(format!("/v0/b/{}/o", BUCKET)))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;

        let persister = firebase_persister(&server);
        let error = persister
            .persist(&source_url, "ring.png", ArtifactKind::Image)
            .await
            .unwrap_err();
        assert_eq!(error.kind, expected, "status {}", status);

        let persisted = persister
            .persist_or_fallback(&source_url, "ring.png", ArtifactKind::Image)
            .await;
        assert_eq!(persisted.url, source_url);
        assert!(persisted.degraded.is_some());
    }
}
