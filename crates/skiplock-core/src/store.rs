//! The pluggable persistence boundary.
//!
//! `Store` is object-safe on purpose: `Queue`, `Poller`, `Reaper` and
//! `Supervisor` all hold an `Arc<dyn Store>` so the rest of the crate never
//! needs to know which backend it's talking to. A scoped transaction with
//! guaranteed commit-or-rollback is a concrete backend detail — it lives as
//! an inherent method on each backend's store type (e.g.
//! `skiplock_postgres::PgStore::with_transaction`), not on this trait, since
//! it isn't object-safe (it's generic over the closure's return type).

use crate::error::StoreError;
use crate::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Insert a new row. `StoreError::DuplicateId` on primary-key collision.
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    /// `StoreError::NotFound` if no row has this id.
    async fn get(&self, id: &str) -> Result<Job, StoreError>;

    /// Jobs whose id contains `substring` (or all jobs if empty), newest
    /// `scheduled_at` first. Used only by out-of-scope admin surfaces.
    async fn search(&self, limit: i64, offset: i64, substring: &str)
        -> Result<Vec<Job>, StoreError>;

    /// Writes back `status, result, last_error, retry_count, scheduled_at,
    /// updated_at`. Never touches `arguments`, `created_at`, `started_at`.
    async fn update(&self, job: &Job) -> Result<(), StoreError>;

    /// `status := canceled` iff current status is `scheduled`; no-op
    /// otherwise — cancelling an in-flight job is a no-op.
    async fn deschedule(&self, id: &str) -> Result<(), StoreError>;

    /// Force `scheduled_at := now(), status := scheduled` regardless of the
    /// prior status.
    async fn schedule_now(&self, id: &str) -> Result<(), StoreError>;

    /// The claim primitive: atomically selects the
    /// smallest-`scheduled_at` claimable row for `queue`, skipping rows
    /// locked by a concurrent transaction, and flips it to `initialized`.
    /// `StoreError::NotFound` means the queue is empty right now.
    async fn poll(&self, queue: &str) -> Result<Job, StoreError>;

    /// Moves every `initialized` row of `queue` whose `started_at` predates
    /// `cutoff` back to `scheduled`, nulling `started_at` and incrementing
    /// `retry_count`. Returns the number of rows reclaimed.
    async fn requeue_timeout(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
