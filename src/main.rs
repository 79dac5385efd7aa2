//! Main entry point for the Generation Job Gateway

use gen_job_gateway::{api, config::Settings, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration before logging so the configured level applies
    let settings = Settings::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }

    info!("Starting Generation Job Gateway");
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        storage = %settings.storage.backend,
        storage_enabled = settings.storage.enabled,
        "Loaded configuration"
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let app_state = Arc::new(AppState::from_settings(settings)?);
    app_state.jobs.start_sweeper(
        app_state.settings.poller.job_retention(),
        app_state.settings.poller.sweep_interval(),
    );
    let app = api::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
