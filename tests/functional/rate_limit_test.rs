//! Functional tests for per-client rate limiting

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use gen_job_gateway::middleware::rate_limit::RateLimitLayer;
use tower::ServiceExt;

fn create_test_app(rps: u32, burst: u32) -> Router {
    Router::new()
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .route("/test", axum::routing::get(|| async { "OK" }))
        .layer(RateLimitLayer::new(rps, burst))
}

fn request_from(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_rate_limit_allows_within_limit() {
    let app = create_test_app(100, 100);

    let response = app
        .oneshot(request_from("/test", "203.0.113.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_health_bypass() {
    let app = create_test_app(1, 1);

    // Far more health checks than the budget allows
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request_from("/health", "203.0.113.2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let app = create_test_app(1, 1);

    let response = app
        .clone()
        .oneshot(request_from("/test", "203.0.113.3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut rate_limited = false;
    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(request_from("/test", "203.0.113.3"))
            .await
            .unwrap();

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            rate_limited = true;
            break;
        }
    }

    assert!(rate_limited, "Expected rate limiting to kick in");
}

#[tokio::test]
async fn test_rate_limit_burst_capacity() {
    let app = create_test_app(1, 5);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request_from("/test", "203.0.113.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_clients_have_separate_budgets() {
    let app = create_test_app(1, 1);

    let first = app
        .clone()
        .oneshot(request_from("/test", "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let throttled = app
        .clone()
        .oneshot(request_from("/test", "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client is unaffected by the first one's exhaustion
    let other = app
        .clone()
        .oneshot(request_from("/test", "198.51.100.8, 10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejection_body_names_the_limit() {
    let app = create_test_app(1, 1);

    app.clone()
        .oneshot(request_from("/test", "192.0.2.9"))
        .await
        .unwrap();
    let response = app
        .oneshot(request_from("/test", "192.0.2.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "rate_limit_exceeded");
    assert_eq!(body["type"], "rate_limit_error");
}
