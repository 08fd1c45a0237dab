//! The user-supplied business logic boundary: treated as a black-box
//! callable.

use crate::error::WorkerResult;
use crate::job::{Job, JobOutput};
use async_trait::async_trait;
use std::future::Future;

/// One queue's business logic. The per-job deadline is enforced externally by the `Handler` via `tokio::time::timeout` around
/// `execute`, rather than threaded through as an explicit context value —
/// Rust cancellation is structural (the future is simply dropped), so a
/// well-behaved worker that wants to notice cancellation early should poll
/// its own sub-futures cooperatively rather than look for a signal here.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the job. `Ok(None)` mirrors the source's `res == nil` — success
    /// with nothing worth persisting as `result`.
    async fn execute(&self, job: &Job) -> WorkerResult<Option<JobOutput>>;
}

/// Adapts a plain async function into a [`Worker`], the way `Register` lets
/// callers pass a bare function instead of implementing a trait.
pub struct FnWorker<F> {
    f: F,
}

impl<F> FnWorker<F> {
    pub fn new(f: F) -> Self {
        FnWorker { f }
    }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = WorkerResult<Option<JobOutput>>> + Send + 'static,
{
    async fn execute(&self, job: &Job) -> WorkerResult<Option<JobOutput>> {
        (self.f)(job.clone()).await
    }
}
