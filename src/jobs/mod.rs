//! Jobs module - remote generation jobs, status polling and the in-memory registry

pub mod poller;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use poller::{JobPoller, PollOutcome, PollerConfig};
pub use registry::{JobGuard, JobRegistry};

/// Lifecycle state of a remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Ready,
    Failed,
    Moderated,
    TimedOut,
}

impl JobState {
    /// No further transition happens from a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

/// What kind of artifact a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
    Music,
}

/// Payload of a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Artifact location, when the vendor delivers one
    pub url: Option<String>,
    /// The vendor's result object, untouched
    pub payload: serde_json::Value,
}

impl JobResult {
    pub fn new(url: Option<String>, payload: serde_json::Value) -> Self {
        Self { url, payload }
    }
}

/// A vendor status report normalized for the poller
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Ready(JobResult),
    Failed(String),
    Moderated(String),
}

/// One remote generation request tracked until it reaches a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Status URL or vendor task id used to query progress
    pub polling_handle: String,
    pub state: JobState,
    pub result: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, polling_handle: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            polling_handle: polling_handle.into(),
            state: JobState::Pending,
            result: None,
            attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the job to `state`, recording an optional failure reason
    pub fn transition(&mut self, state: JobState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, result: Option<String>) {
        self.result = result;
        self.transition(JobState::Ready, None);
    }
}

/// A vendor endpoint that can report the status of a submitted job
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Vendor name used in logs
    fn name(&self) -> &str;

    /// Query the status once.
    ///
    /// Errors are treated as transient by the poller.
    async fn check(&self, handle: &str) -> Result<JobStatus>;
}
