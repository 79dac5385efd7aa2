//! Generation Job Gateway
//!
//! An HTTP gateway in front of third-party generation vendors. Submissions go
//! through a single-lane queue, long-running vendor jobs are polled with a
//! bounded attempt budget, and delivered artifacts are copied into durable
//! object storage.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod provider;
pub mod queue;
pub mod storage;

pub use error::{AppError, Result};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use jobs::{JobPoller, JobRegistry, PollerConfig};
use provider::{BflClient, MiniMaxClient};
use queue::{QueueConfig, SubmissionQueue};
use storage::ArtifactPersister;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub queue: SubmissionQueue,
    pub poller: Arc<JobPoller>,
    pub jobs: Arc<JobRegistry>,
    pub bfl: Arc<BflClient>,
    pub minimax: Arc<MiniMaxClient>,
    /// `None` when storage is disabled; vendor URLs are then relayed as-is
    pub persister: Option<Arc<ArtifactPersister>>,
    /// Client used by the image proxy
    pub http: reqwest::Client,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire every component from configuration
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let jobs = Arc::new(JobRegistry::new());
        let poller = JobPoller::with_config(PollerConfig::from(&settings.poller))
            .with_registry(jobs.clone());
        let queue = SubmissionQueue::with_config(QueueConfig::from(&settings.queue));

        let bfl = BflClient::new(&settings.providers.bfl)?;
        let minimax = MiniMaxClient::new(&settings.providers.minimax)?;

        let persister = if settings.storage.enabled {
            let persister = ArtifactPersister::from_config(&settings.storage)?;
            info!(backend = persister.store_name(), "Artifact persistence enabled");
            Some(Arc::new(persister))
        } else {
            info!("Artifact persistence disabled; vendor URLs are relayed");
            None
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("gen-job-gateway-proxy/0.1")
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            settings: Arc::new(settings),
            queue,
            poller: Arc::new(poller),
            jobs,
            bfl: Arc::new(bfl),
            minimax: Arc::new(minimax),
            persister,
            http,
            started_at: Utc::now(),
        })
    }
}
