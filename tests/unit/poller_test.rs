//! Unit tests for the job poller

use async_trait::async_trait;
use gen_job_gateway::jobs::{
    Job, JobKind, JobPoller, JobRegistry, JobResult, JobState, JobStatus, PollOutcome, PollerConfig,
    StatusSource,
};
use gen_job_gateway::{AppError, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Replays scripted responses, then reports pending forever
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<JobStatus>>>,
    calls: AtomicU32,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<JobStatus>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn check(&self, _handle: &str) -> Result<JobStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobStatus::Pending))
    }
}

fn poller(max_attempts: u32, interval_ms: u64) -> JobPoller {
    JobPoller::with_config(PollerConfig {
        max_attempts,
        interval: Duration::from_millis(interval_ms),
    })
}

fn ready(url: &str) -> JobStatus {
    JobStatus::Ready(JobResult::new(Some(url.to_string()), json!({ "sample": url })))
}

fn transient() -> AppError {
    AppError::BackendError("Polling returned 503 Service Unavailable".to_string())
}

#[test]
fn test_poller_config_defaults() {
    let config = PollerConfig::default();

    assert_eq!(config.max_attempts, 30);
    assert_eq!(config.interval, Duration::from_millis(2000));
}

#[tokio::test]
async fn test_ready_after_two_pending() {
    let source = ScriptedSource::new(vec![
        Ok(JobStatus::Pending),
        Ok(JobStatus::Pending),
        Ok(ready("https://cdn.example/a.png")),
    ]);
    let mut job = Job::new("job-1", JobKind::Image, "https://api.example/poll/1");

    let outcome = poller(10, 5).poll(&source, &mut job).await;

    assert_eq!(source.calls(), 3);
    match outcome {
        PollOutcome::Ready(result) => {
            assert_eq!(result.url.as_deref(), Some("https://cdn.example/a.png"));
            assert_eq!(result.payload["sample"], "https://cdn.example/a.png");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(job.state, JobState::Ready);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.result.as_deref(), Some("https://cdn.example/a.png"));
}

#[tokio::test]
async fn test_times_out_after_exact_budget() {
    let source = ScriptedSource::new(vec![]);
    let mut job = Job::new("job-2", JobKind::Image, "handle");

    let outcome = poller(3, 5).poll(&source, &mut job).await;

    assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
    assert_eq!(source.calls(), 3);
    assert_eq!(job.state, JobState::TimedOut);
    assert!(matches!(
        outcome.into_result(),
        Err(AppError::GenerationTimeout { attempts: 3 })
    ));
}

#[tokio::test]
async fn test_error_on_first_query_fails_immediately() {
    let source = ScriptedSource::new(vec![Ok(JobStatus::Failed("Error".to_string()))]);
    let mut job = Job::new("job-3", JobKind::Image, "handle");

    let outcome = poller(30, 5).poll(&source, &mut job).await;

    assert_eq!(outcome, PollOutcome::Failed("Error".to_string()));
    assert_eq!(source.calls(), 1);
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_deref(), Some("Error"));
}

#[tokio::test]
async fn test_moderation_is_terminal() {
    let source = ScriptedSource::new(vec![
        Ok(JobStatus::Pending),
        Ok(JobStatus::Moderated("Request Moderated".to_string())),
    ]);
    let mut job = Job::new("job-4", JobKind::Image, "handle");

    let outcome = poller(30, 5).poll(&source, &mut job).await;

    assert_eq!(outcome, PollOutcome::Moderated("Request Moderated".to_string()));
    assert_eq!(source.calls(), 2);
    assert!(matches!(outcome.into_result(), Err(AppError::Moderated(_))));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let source = ScriptedSource::new(vec![
        Err(transient()),
        Err(transient()),
        Ok(ready("https://cdn.example/b.png")),
    ]);
    let mut job = Job::new("job-5", JobKind::Video, "task-5");

    let outcome = poller(5, 5).poll(&source, &mut job).await;

    assert!(outcome.is_ready());
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_error_on_last_attempt_is_surfaced() {
    let source = ScriptedSource::new(vec![
        Ok(JobStatus::Pending),
        Ok(JobStatus::Pending),
        Err(transient()),
    ]);
    let mut job = Job::new("job-6", JobKind::Image, "handle");

    let outcome = poller(3, 5).poll(&source, &mut job).await;

    match outcome {
        PollOutcome::Unreachable(reason) => assert!(reason.contains("503")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_waits_interval_between_attempts_only() {
    let source = ScriptedSource::new(vec![]);
    let mut job = Job::new("job-7", JobKind::Image, "handle");

    let started = Instant::now();
    poller(3, 100).poll(&source, &mut job).await;
    let elapsed = started.elapsed();

    // Two sleeps between three attempts, none after the last
    assert!(elapsed >= Duration::from_millis(200), "polled in {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(290), "polled in {:?}", elapsed);
}

#[tokio::test]
async fn test_poll_with_closure_receives_handle() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut job = Job::new("job-8", JobKind::Video, "task-42");

    let outcome = poller(5, 1)
        .poll_with(&mut job, |handle| {
            let seen = seen.clone();
            async move {
                let mut seen = seen.lock().unwrap();
                seen.push(handle);
                if seen.len() == 2 {
                    Ok(JobStatus::Ready(JobResult::new(None, json!({ "file_id": "f-1" }))))
                } else {
                    Ok(JobStatus::Pending)
                }
            }
        })
        .await;

    assert!(outcome.is_ready());
    assert_eq!(*seen.lock().unwrap(), vec!["task-42".to_string(), "task-42".to_string()]);
}

#[tokio::test]
async fn test_registry_sees_every_attempt() {
    let registry = Arc::new(JobRegistry::new());
    let poller = poller(5, 1).with_registry(registry.clone());
    let source = ScriptedSource::new(vec![
        Ok(JobStatus::Pending),
        Ok(ready("https://cdn.example/c.png")),
    ]);

    let mut job = Job::new("job-9", JobKind::Image, "handle");
    registry.insert(job.clone());
    poller.poll(&source, &mut job).await;

    let snapshot = registry.get("job-9").unwrap();
    assert_eq!(snapshot.state, JobState::Ready);
    assert_eq!(snapshot.attempts, 2);

    // Terminal snapshots are handed out once
    assert!(registry.take_if_terminal("job-9").is_some());
    assert!(registry.get("job-9").is_none());
}
