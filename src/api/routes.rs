//! Route table and layer stack

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{health, images, inpaint, jobs, music, proxy, uploads, videos};
use crate::middleware::RateLimitLayer;
use crate::AppState;

/// Base64 inflates payloads by a third; leave room for the JSON around it
const BODY_LIMIT_HEADROOM: usize = 1024 * 1024;

/// Inpainting carries an image and its mask in one body
const IMAGES_PER_BODY: usize = 2;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let api = Router::new()
        .route("/v1/images/kontext", post(images::generate_kontext))
        .route("/v1/images/studio", post(images::generate_studio))
        .route("/v1/images/inpaint", post(inpaint::inpaint).get(inpaint::inpaint_status))
        .route("/v1/videos", post(videos::create_video))
        .route("/v1/videos/status", post(videos::video_status))
        .route("/v1/videos/download", post(videos::download_video))
        .route("/v1/music", post(music::generate_music))
        .route("/v1/jobs/:id", get(jobs::get_job))
        .route("/v1/uploads", post(uploads::upload_image))
        .route("/v1/proxy/image", get(proxy::proxy_image))
        .route("/v1/proxy/download", get(proxy::proxy_download));

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .merge(api);

    let storage = &settings.storage;
    if storage.enabled && storage.backend == "local" {
        info!(path = %storage.base_path, "Serving stored files under /files");
        router = router.nest_service("/files", ServeDir::new(&storage.base_path));
    }

    let body_limit = storage.max_upload_bytes / 3 * 4 * IMAGES_PER_BODY + BODY_LIMIT_HEADROOM;
    let mut router = router
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    if settings.rate_limit.enabled {
        let rate_limit = RateLimitLayer::new(
            settings.rate_limit.requests_per_second,
            settings.rate_limit.burst_size,
        );
        rate_limit.start_cleanup(Duration::from_secs(settings.rate_limit.cleanup_interval_secs));
        router = router.layer(rate_limit);
    }

    router
        .layer(TimeoutLayer::new(Duration::from_secs(settings.server.request_timeout_secs)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
