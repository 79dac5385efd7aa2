//! Single-lane submission queue for vendor calls
//!
//! Vendors rate-limit aggressively, so every submission goes through one FIFO
//! lane: one task at a time, with a fixed pause between consecutive tasks.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::QueueSettings;
use crate::error::{AppError, Result};

/// A deferred unit of work. The future owns the caller's completion channel.
struct QueuedTask {
    id: u64,
    work: BoxFuture<'static, bool>,
}

/// Configuration for the submission queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pause inserted between two consecutive tasks
    pub delay: Duration,
    /// Maximum number of tasks waiting for their turn
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2000),
            max_pending: 100,
        }
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            delay: settings.delay(),
            max_pending: settings.max_pending,
        }
    }
}

struct Inner {
    config: QueueConfig,
    tasks: Mutex<VecDeque<QueuedTask>>,
    processing: AtomicBool,
    next_id: AtomicU64,
    processed_count: AtomicU64,
    failed_count: AtomicU64,
}

/// FIFO queue running at most one task at a time
#[derive(Clone)]
pub struct SubmissionQueue {
    inner: Arc<Inner>,
}

impl SubmissionQueue {
    /// Create a new queue with default configuration
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a new queue with custom configuration
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tasks: Mutex::new(VecDeque::new()),
                processing: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                processed_count: AtomicU64::new(0),
                failed_count: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `work` and wait for its outcome.
    ///
    /// The returned result is the work's own result. A panic inside the work
    /// is reported as `AppError::Internal` and does not stop the queue.
    pub async fn enqueue<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let work = async move {
            let outcome = AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(AppError::Internal("queued task panicked".to_string())));
            let succeeded = outcome.is_ok();
            // The caller may have gone away; the work still counts as done.
            let _ = response_tx.send(outcome);
            succeeded
        }
        .boxed();

        {
            let mut tasks = self.inner.tasks.lock();
            if tasks.len() >= self.inner.config.max_pending {
                return Err(AppError::QueueFull(tasks.len()));
            }
            tasks.push_back(QueuedTask { id, work });
            debug!(task_id = id, pending = tasks.len(), "Task queued");
        }

        self.process();

        response_rx
            .await
            .map_err(|_| AppError::Internal("Submission queue dropped the task".to_string()))?
    }

    /// Start the drain loop unless one is already running
    fn process(&self) {
        if self
            .inner
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drain().await;
        });
    }

    /// Number of tasks waiting for their turn
    pub fn pending_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Whether a task is currently being drained
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending_count(),
            processing: self.is_processing(),
            processed: self.inner.processed_count.load(Ordering::Relaxed),
            failed: self.inner.failed_count.load(Ordering::Relaxed),
            delay_ms: self.inner.config.delay.as_millis() as u64,
            max_pending: self.inner.config.max_pending,
        }
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.tasks.lock().pop_front();

            let Some(task) = next else {
                self.processing.store(false, Ordering::Release);
                // An enqueue may have slipped in after the pop but before the
                // flag was cleared; it saw `processing == true` and left the
                // task for us.
                let raced = !self.tasks.lock().is_empty();
                if raced
                    && self
                        .processing
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    continue;
                }
                break;
            };

            debug!(task_id = task.id, "Running queued task");
            if task.work.await {
                self.processed_count.fetch_add(1, Ordering::Relaxed);
            } else {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                warn!(task_id = task.id, "Queued task failed");
            }

            let more = !self.tasks.lock().is_empty();
            if more && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: bool,
    pub processed: u64,
    pub failed: u64,
    pub delay_ms: u64,
    pub max_pending: usize,
}
