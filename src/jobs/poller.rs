//! Fixed-interval status poller with a bounded attempt budget

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PollerSettings;
use crate::error::{AppError, Result};
use crate::jobs::{Job, JobRegistry, JobResult, JobState, JobStatus, StatusSource};

/// Configuration for the job poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Maximum number of status queries per job
    pub max_attempts: u32,
    /// Pause between two status queries
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(2000),
        }
    }
}

impl From<&PollerSettings> for PollerConfig {
    fn from(settings: &PollerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: settings.interval(),
        }
    }
}

/// Terminal outcome of a polling run
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(JobResult),
    /// The vendor reported an explicit failure
    Failed(String),
    /// The vendor rejected the request or its output
    Moderated(String),
    /// The budget ran out while the job was still pending
    TimedOut { attempts: u32 },
    /// The final status query itself failed
    Unreachable(String),
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn into_result(self) -> Result<JobResult> {
        match self {
            PollOutcome::Ready(result) => Ok(result),
            PollOutcome::Failed(reason) => Err(AppError::GenerationFailed(reason)),
            PollOutcome::Moderated(reason) => Err(AppError::Moderated(reason)),
            PollOutcome::TimedOut { attempts } => Err(AppError::GenerationTimeout { attempts }),
            PollOutcome::Unreachable(reason) => Err(AppError::BackendError(format!(
                "Polling failed after maximum attempts: {}",
                reason
            ))),
        }
    }
}

/// Polls a job's status until it reaches a terminal state
pub struct JobPoller {
    config: PollerConfig,
    registry: Option<Arc<JobRegistry>>,
}

impl JobPoller {
    /// Create a new poller with default configuration
    pub fn new() -> Self {
        Self::with_config(PollerConfig::default())
    }

    /// Create a new poller with custom configuration
    pub fn with_config(config: PollerConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Publish every attempt's snapshot into `registry`
    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll `job` against a vendor status source
    pub async fn poll(&self, source: &dyn StatusSource, job: &mut Job) -> PollOutcome {
        debug!(job_id = %job.id, source = source.name(), "Polling job");
        self.poll_with(job, move |handle| async move { source.check(&handle).await })
            .await
    }

    /// Poll `job`, calling `check` with the job's polling handle once per attempt
    pub async fn poll_with<F, Fut>(&self, job: &mut Job, mut check: F) -> PollOutcome
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<JobStatus>>,
    {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            job.attempts = attempt;
            debug!(job_id = %job.id, attempt, max_attempts, "Checking job status");

            match check(job.polling_handle.clone()).await {
                Ok(JobStatus::Ready(result)) => {
                    job.complete(result.url.clone());
                    self.publish(job);
                    info!(job_id = %job.id, attempts = attempt, "Job ready");
                    return PollOutcome::Ready(result);
                }
                Ok(JobStatus::Failed(reason)) => {
                    job.transition(JobState::Failed, Some(reason.clone()));
                    self.publish(job);
                    warn!(job_id = %job.id, reason = %reason, "Job failed");
                    return PollOutcome::Failed(reason);
                }
                Ok(JobStatus::Moderated(reason)) => {
                    job.transition(JobState::Moderated, Some(reason.clone()));
                    self.publish(job);
                    warn!(job_id = %job.id, reason = %reason, "Job moderated");
                    return PollOutcome::Moderated(reason);
                }
                Ok(JobStatus::Pending) => {}
                Err(e) => {
                    warn!(job_id = %job.id, attempt, error = %e, "Status check failed");
                    if attempt == max_attempts {
                        job.transition(JobState::Failed, Some(e.to_string()));
                        self.publish(job);
                        return PollOutcome::Unreachable(e.to_string());
                    }
                }
            }

            self.publish(job);
            if attempt < max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        job.transition(
            JobState::TimedOut,
            Some(format!("Generation timed out after {} status checks", max_attempts)),
        );
        self.publish(job);
        warn!(job_id = %job.id, attempts = max_attempts, "Job timed out");
        PollOutcome::TimedOut {
            attempts: max_attempts,
        }
    }

    fn publish(&self, job: &Job) {
        if let Some(registry) = &self.registry {
            registry.record(job);
        }
    }
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new()
    }
}
