//! In-memory registry of jobs that have not been relayed yet

use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

use crate::jobs::Job;

/// Registry of in-flight jobs, keyed by job id.
///
/// State is per process. Terminal jobs stay until they are read once through
/// [`take_if_terminal`](Self::take_if_terminal) or outlive the retention window.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted job
    pub fn insert(&self, job: Job) {
        debug!(job_id = %job.id, kind = ?job.kind, "Registered job");
        self.jobs.insert(job.id.clone(), job);
    }

    /// Register `job` for the lifetime of the returned guard.
    ///
    /// Dropping the guard while the job is still pending discards it, so an
    /// abandoned request leaves nothing behind. Terminal snapshots survive.
    pub fn track(self: &Arc<Self>, job: Job) -> JobGuard {
        let id = job.id.clone();
        self.insert(job);
        JobGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Store the latest snapshot of `job`
    pub fn record(&self, job: &Job) {
        self.jobs.insert(job.id.clone(), job.clone());
    }

    /// Get a snapshot of a job
    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// Get a snapshot; terminal jobs are removed by the read
    pub fn take_if_terminal(&self, id: &str) -> Option<Job> {
        if let Some((_, job)) = self.jobs.remove_if(id, |_, job| job.state.is_terminal()) {
            return Some(job);
        }
        self.get(id)
    }

    /// Drop terminal jobs last updated more than `retention` ago
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now().checked_sub_signed(retention);
        let before = self.jobs.len();
        if let Some(cutoff) = cutoff {
            self.jobs
                .retain(|_, job| !(job.state.is_terminal() && job.updated_at <= cutoff));
        }
        before.saturating_sub(self.jobs.len())
    }

    /// Start the background sweep of expired terminal jobs.
    ///
    /// The task ends once the registry itself is dropped.
    pub fn start_sweeper(self: &Arc<Self>, retention: Duration, every: Duration) {
        let registry: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let purged = registry.purge_expired(retention);
                if purged > 0 {
                    info!(purged, remaining = registry.len(), "Swept unread finished jobs");
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Keeps a job registered while a request drives it
pub struct JobGuard {
    registry: Arc<JobRegistry>,
    id: String,
}

impl JobGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self
            .registry
            .jobs
            .remove_if(&self.id, |_, job| !job.state.is_terminal())
            .is_some()
        {
            debug!(job_id = %self.id, "Discarded unfinished job");
        }
    }
}
