//! Unit tests for the submission queue

use futures::future::join_all;
use gen_job_gateway::queue::{QueueConfig, SubmissionQueue};
use gen_job_gateway::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

fn queue_with_delay(delay_ms: u64) -> SubmissionQueue {
    SubmissionQueue::with_config(QueueConfig {
        delay: Duration::from_millis(delay_ms),
        max_pending: 100,
    })
}

#[test]
fn test_queue_config_defaults() {
    let config = QueueConfig::default();

    assert_eq!(config.delay, Duration::from_millis(2000));
    assert_eq!(config.max_pending, 100);
}

#[tokio::test]
async fn test_tasks_run_in_order_without_overlap() {
    let queue = queue_with_delay(0);
    let order = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let calls = (0..5).map(|i| {
        let order = order.clone();
        let active = active.clone();
        let max_active = max_active.clone();
        queue.enqueue(move || async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            order.lock().unwrap().push(i);
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, AppError>(i * 10)
        })
    });

    let results = join_all(calls).await;

    let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, vec![0, 10, 20, 30, 40]);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_task_does_not_block_queue() {
    let queue = queue_with_delay(0);

    let first = queue.enqueue(|| async { Ok::<_, AppError>("first") });
    let second = queue.enqueue(|| async {
        Err::<&str, _>(AppError::BackendError("vendor exploded".to_string()))
    });
    let third = queue.enqueue(|| async { Ok::<_, AppError>("third") });

    let (first, second, third) = tokio::join!(first, second, third);

    assert_eq!(assert_ok!(first), "first");
    let error = assert_err!(second);
    assert!(matches!(error, AppError::BackendError(ref m) if m == "vendor exploded"));
    assert_eq!(assert_ok!(third), "third");

    let stats = queue.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_delay_applies_between_tasks_only() {
    let queue = queue_with_delay(50);
    let started = Instant::now();

    let calls = (0..3).map(|i| {
        queue.enqueue(move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, AppError>(i)
        })
    });
    let results = join_all(calls).await;

    let elapsed = started.elapsed();
    let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, vec![0, 1, 2]);
    // 3 x 10 ms of work plus two 50 ms pauses
    assert!(elapsed >= Duration::from_millis(130), "drained in {:?}", elapsed);
}

#[tokio::test]
async fn test_no_trailing_delay_and_restart_after_idle() {
    let queue = queue_with_delay(300);

    let started = Instant::now();
    let value = queue.enqueue(|| async { Ok::<_, AppError>(1) }).await;
    assert_eq!(assert_ok!(value), 1);
    assert!(started.elapsed() < Duration::from_millis(300));

    // Let the drain loop exit, then make sure a new enqueue restarts it
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!queue.is_processing());

    let value = queue.enqueue(|| async { Ok::<_, AppError>(2) }).await;
    assert_eq!(assert_ok!(value), 2);
}

#[tokio::test]
async fn test_panicking_task_is_reported_and_queue_continues() {
    let queue = queue_with_delay(0);

    let panicked = queue
        .enqueue(|| async {
            if true {
                panic!("boom");
            }
            Ok::<_, AppError>(())
        })
        .await;
    assert!(matches!(panicked, Err(AppError::Internal(_))));

    let value = queue.enqueue(|| async { Ok::<_, AppError>("after") }).await;
    assert_eq!(assert_ok!(value), "after");
}

#[tokio::test]
async fn test_queue_full_rejects_new_tasks() {
    let queue = SubmissionQueue::with_config(QueueConfig {
        delay: Duration::ZERO,
        max_pending: 1,
    });

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let running = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .enqueue(move || async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, AppError>("running")
                })
                .await
        })
    };
    started_rx.await.unwrap();

    let waiting = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(|| async { Ok::<_, AppError>("waiting") }).await })
    };
    while queue.pending_count() < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let rejected = queue.enqueue(|| async { Ok::<_, AppError>("rejected") }).await;
    assert!(matches!(rejected, Err(AppError::QueueFull(1))));

    release_tx.send(()).unwrap();
    assert_eq!(running.await.unwrap().unwrap(), "running");
    assert_eq!(waiting.await.unwrap().unwrap(), "waiting");
}
