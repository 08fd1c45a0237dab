//! Exercises the `FOR UPDATE SKIP LOCKED` claim query and the stall-reclaim
//! query against a real Postgres instance. Spun up and migrated
//! automatically by `sqlx::test`; skipped entirely unless a test database is
//! reachable the way the rest of the `sqlx::test` suites in this workspace
//! expect.

use chrono::{Duration as ChronoDuration, Utc};
use skiplock_core::{Job, JobStatus, Store};
use skiplock_postgres::PgStore;
use sqlx::PgPool;

fn new_job(id: &str, queue: &str) -> Job {
    Job::new(id, queue, b"{}".to_vec())
}

#[sqlx::test(migrations = "./migrations")]
async fn poll_claims_oldest_job_and_skips_locked_rows(db: PgPool) {
    let store = PgStore::new(db);

    let mut older = new_job("job-older", "emails");
    older.scheduled_at = Utc::now() - ChronoDuration::seconds(5);
    let mut newer = new_job("job-newer", "emails");
    newer.scheduled_at = Utc::now();

    store.create(&newer).await.expect("create newer");
    store.create(&older).await.expect("create older");

    let claimed = store.poll("emails").await.expect("poll should claim a row");
    assert_eq!(claimed.id, "job-older");
    assert_eq!(claimed.status, JobStatus::Initialized);
    assert!(claimed.started_at.is_some());

    // A second poll must not double-claim the same row; only "job-newer"
    // is still claimable.
    let second = store.poll("emails").await.expect("poll should claim the other row");
    assert_eq!(second.id, "job-newer");

    // The queue is now empty.
    let empty = store.poll("emails").await;
    assert!(matches!(empty, Err(skiplock_core::StoreError::NotFound)));
}

#[sqlx::test(migrations = "./migrations")]
async fn poll_ignores_jobs_in_other_queues(db: PgPool) {
    let store = PgStore::new(db);
    store.create(&new_job("job-1", "emails")).await.expect("create");
    store.create(&new_job("job-2", "webhooks")).await.expect("create");

    let claimed = store.poll("webhooks").await.expect("poll webhooks");
    assert_eq!(claimed.id, "job-2");

    let empty = store.poll("webhooks").await;
    assert!(matches!(empty, Err(skiplock_core::StoreError::NotFound)));
}

#[sqlx::test(migrations = "./migrations")]
async fn requeue_timeout_reclaims_only_stalled_rows(db: PgPool) {
    let store = PgStore::new(db);
    store.create(&new_job("stalled", "emails")).await.expect("create");
    store.create(&new_job("fresh", "emails")).await.expect("create");

    let stalled = store.poll("emails").await.expect("claim stalled");
    let fresh = store.poll("emails").await.expect("claim fresh");
    assert_eq!(stalled.retry_count, 0);

    // Back-date only the "stalled" job's started_at so the cutoff catches
    // it but not the one claimed a moment ago.
    sqlx::query("UPDATE jobs SET started_at = now() - interval '1 hour' WHERE id = $1")
        .bind(&stalled.id)
        .execute(store.pool())
        .await
        .expect("back-date started_at");

    let cutoff = Utc::now() - ChronoDuration::minutes(1);
    let reclaimed = store.requeue_timeout("emails", cutoff).await.expect("requeue_timeout");
    assert_eq!(reclaimed, 1);

    let reclaimed_job = store.get(&stalled.id).await.expect("get reclaimed job");
    assert_eq!(reclaimed_job.status, JobStatus::Scheduled);
    assert_eq!(reclaimed_job.retry_count, 1);
    assert!(reclaimed_job.started_at.is_none());

    let untouched = store.get(&fresh.id).await.expect("get fresh job");
    assert_eq!(untouched.status, JobStatus::Initialized);
}

#[sqlx::test(migrations = "./migrations")]
async fn create_rejects_duplicate_ids(db: PgPool) {
    let store = PgStore::new(db);
    store.create(&new_job("dup", "emails")).await.expect("first create");

    let err = store
        .create(&new_job("dup", "emails"))
        .await
        .expect_err("second create with the same id must fail");
    assert!(matches!(err, skiplock_core::StoreError::DuplicateId));
}
