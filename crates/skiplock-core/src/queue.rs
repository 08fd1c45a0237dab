//! Per-queue view over a [`Store`].

use crate::error::StoreError;
use crate::job::Job;
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Bound to one queue name and one store handle. Cheap to clone: cloning
/// shares the underlying `Arc<dyn Store>`.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    name: String,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Queue {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim one job, or `StoreError::NotFound` if none are ready.
    pub async fn poll(&self) -> Result<Job, StoreError> {
        self.store.poll(&self.name).await
    }

    /// Reclaim jobs whose worker has stalled longer than `worker_timeout`.
    pub async fn requeue_timeout(&self, worker_timeout: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(worker_timeout).unwrap_or(chrono::Duration::zero());
        self.store.requeue_timeout(&self.name, cutoff).await
    }
}
