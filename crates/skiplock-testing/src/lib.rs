//! An in-memory [`Store`] for exercising a `Client`, `Poller`, or `Reaper`
//! in tests without a database, the same role the host repo's mock job
//! queue plays for its dispatcher tests: a plain `Mutex`-guarded collection
//! behind the same trait real callers use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiplock_core::{Job, JobStatus, Store, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;

/// Not lock-free and not meant to be: a `std::sync::Mutex` guarding a
/// `HashMap` is plenty for single-process tests, and keeping it simple makes
/// the claim semantics easy to read back as plain code.
#[derive(Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Snapshot every job currently held, for assertions.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateId);
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn search(&self, limit: i64, offset: i64, substring: &str) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.lock().unwrap();
        let mut matches: Vec<Job> = jobs
            .values()
            .filter(|j| substring.is_empty() || j.id.contains(substring))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let existing = jobs.get_mut(&job.id).ok_or(StoreError::NotFound)?;
        existing.status = job.status;
        existing.result = job.result.clone();
        existing.last_error = job.last_error.clone();
        existing.retry_count = job.retry_count;
        existing.scheduled_at = job.scheduled_at;
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn deschedule(&self, id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or(StoreError::NotFound)?;
        if job.status == JobStatus::Scheduled {
            job.status = JobStatus::Canceled;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn schedule_now(&self, id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or(StoreError::NotFound)?;
        job.scheduled_at = Utc::now();
        job.status = JobStatus::Scheduled;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn poll(&self, queue: &str) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = Utc::now();
        let claimable_id = jobs
            .values()
            .filter(|j| j.queue_name == queue && j.status == JobStatus::Scheduled && j.scheduled_at <= now)
            .min_by_key(|j| j.scheduled_at)
            .map(|j| j.id.clone());

        match claimable_id {
            Some(id) => {
                let job = jobs.get_mut(&id).expect("id just came from this map");
                job.status = JobStatus::Initialized;
                job.started_at = Some(now);
                job.updated_at = now;
                Ok(job.clone())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn requeue_timeout(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = Utc::now();
        let mut reclaimed = 0u64;
        for job in jobs.values_mut() {
            let stalled = job.queue_name == queue
                && job.status == JobStatus::Initialized
                && job.started_at.is_some_and(|s| s < cutoff);
            if stalled {
                job.status = JobStatus::Scheduled;
                job.started_at = None;
                job.retry_count += 1;
                job.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, queue: &str) -> Job {
        Job::new(id, queue, b"{}".to_vec())
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = InMemoryStore::new();
        store.create(&job("a", "q")).await.unwrap();
        let err = store.create(&job("a", "q")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId));
    }

    #[tokio::test]
    async fn poll_claims_oldest_scheduled_job_only_once() {
        let store = InMemoryStore::new();
        let mut older = job("a", "q");
        older.scheduled_at = Utc::now() - chrono::Duration::seconds(10);
        store.create(&older).await.unwrap();
        store.create(&job("b", "q")).await.unwrap();

        let claimed = store.poll("q").await.unwrap();
        assert_eq!(claimed.id, "a");
        assert_eq!(claimed.status, JobStatus::Initialized);

        let next = store.poll("q").await.unwrap();
        assert_eq!(next.id, "b");

        assert!(matches!(store.poll("q").await.unwrap_err(), StoreError::NotFound));
    }

    #[tokio::test]
    async fn poll_ignores_other_queues() {
        let store = InMemoryStore::new();
        store.create(&job("a", "other")).await.unwrap();
        assert!(matches!(store.poll("q").await.unwrap_err(), StoreError::NotFound));
    }

    #[tokio::test]
    async fn deschedule_is_a_noop_once_initialized() {
        let store = InMemoryStore::new();
        store.create(&job("a", "q")).await.unwrap();
        store.poll("q").await.unwrap();
        store.deschedule("a").await.unwrap();
        let j = store.get("a").await.unwrap();
        assert_eq!(j.status, JobStatus::Initialized);
    }

    #[tokio::test]
    async fn requeue_timeout_reclaims_stalled_jobs() {
        let store = InMemoryStore::new();
        store.create(&job("a", "q")).await.unwrap();
        store.poll("q").await.unwrap();

        let reclaimed = store.requeue_timeout("q", Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let j = store.get("a").await.unwrap();
        assert_eq!(j.status, JobStatus::Scheduled);
        assert_eq!(j.retry_count, 1);
        assert!(j.started_at.is_none());
    }
}
