//! Scenario tests driving the public `Client` facade end-to-end against
//! `InMemoryStore`: no database, but the same claim/retry/cancel machinery
//! a `PgStore`-backed deployment runs.

use skiplock_core::{Client, ClientOptions, Job, JobOutput, JobStatus, RegisterOptions, ScheduleOptions, Store};
use skiplock_testing::InMemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_options() -> ClientOptions {
    ClientOptions {
        sleep_interval: Duration::from_millis(15),
        reaper_interval: Duration::from_millis(50),
        ..ClientOptions::default()
    }
}

async fn wait_until(store: &InMemoryStore, id: &str, pred: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..200 {
        if let Ok(job) = store.get(id).await {
            if pred(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for job {id}");
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_job_completes_once() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(Client::new_with_options(store.clone(), fast_options()));

    client.register_fn(
        "echo",
        |_job| async move { Ok(Some(JobOutput::new(serde_json::json!({"ok": true})))) },
        RegisterOptions::new(),
    );
    client
        .schedule("job-1", "echo", &serde_json::json!({"x": 1}), ScheduleOptions::new())
        .await
        .unwrap();

    let runner = {
        let c = client.clone();
        tokio::spawn(async move { c.start().await })
    };

    let job = wait_until(&store, "job-1", |j| j.status == JobStatus::Completed).await;
    assert!(job.result.is_some());

    client.stop();
    runner.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_job_retries_then_succeeds() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(Client::new_with_options(store.clone(), fast_options()));

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_worker = attempts.clone();
    client.register_fn(
        "flaky",
        move |_job| {
            let attempts = attempts_for_worker.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("transient failure");
                }
                Ok(None)
            }
        },
        RegisterOptions::new(),
    );

    client
        .schedule(
            "job-2",
            "flaky",
            &serde_json::json!({}),
            ScheduleOptions::new()
                .max_retries(2)
                .retry_interval(Duration::from_millis(20)),
        )
        .await
        .unwrap();

    let runner = {
        let c = client.clone();
        tokio::spawn(async move { c.start().await })
    };

    let job = wait_until(&store, "job-2", |j| j.status == JobStatus::Completed).await;
    assert_eq!(job.retry_count, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    client.stop();
    runner.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_job_exhausts_retries_and_terminates() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(Client::new_with_options(store.clone(), fast_options()));

    client.register_fn(
        "always_fails",
        |_job| async move { anyhow::bail!("permanent failure") },
        RegisterOptions::new(),
    );

    client
        .schedule(
            "job-3",
            "always_fails",
            &serde_json::json!({}),
            ScheduleOptions::new()
                .max_retries(1)
                .retry_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();

    let runner = {
        let c = client.clone();
        tokio::spawn(async move { c.start().await })
    };

    let job = wait_until(&store, "job-3", |j| j.status == JobStatus::Failed).await;
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("permanent failure"));

    client.stop();
    runner.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn canceling_a_scheduled_job_prevents_it_from_running() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(Client::new_with_options(store.clone(), fast_options()));

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_for_worker = ran.clone();
    client.register_fn(
        "never",
        move |_job| {
            let ran = ran_for_worker.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        },
        RegisterOptions::new(),
    );

    client
        .schedule("job-4", "never", &serde_json::json!({}), ScheduleOptions::new())
        .await
        .unwrap();
    client.cancel("job-4").await.unwrap();

    let runner = {
        let c = client.clone();
        tokio::spawn(async move { c.start().await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    client.stop();
    runner.await.unwrap();

    let job = store.get("job-4").await.unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reaper_reclaims_a_stalled_job_directly() {
    use skiplock_core::{Queue, Reaper};

    let store = Arc::new(InMemoryStore::new());
    let job = Job::new("job-5", "stalled", b"{}".to_vec());
    store.create(&job).await.unwrap();
    store.poll("stalled").await.unwrap(); // now `initialized`, started_at = now

    let queue = Queue::new(store.clone(), "stalled");
    // worker_timeout of zero means "stalled the instant it started" for this test.
    let reclaimed = queue.requeue_timeout(Duration::from_millis(0)).await.unwrap();
    assert_eq!(reclaimed, 1);

    let job = store.get("job-5").await.unwrap();
    assert_eq!(job.status, JobStatus::Scheduled);
    assert_eq!(job.retry_count, 1);
    assert!(job.started_at.is_none());

    // Exercise the long-running Reaper loop itself, not just the one-shot
    // requeue it wraps: it should tick at least once before shutdown.
    store.poll("stalled").await.unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (errors, mut err_rx) = tokio::sync::mpsc::unbounded_channel();
    let reaper = Reaper::new(queue, Duration::from_millis(20), Duration::from_millis(0));
    let handle = tokio::spawn(async move { reaper.run(shutdown_rx, errors).await });

    tokio::time::sleep(Duration::from_millis(80)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert!(err_rx.try_recv().is_err());

    let job = store.get("job-5").await.unwrap();
    assert_eq!(job.status, JobStatus::Scheduled);
    assert_eq!(job.retry_count, 2);
}
