//! Wraps one user worker: executes it, applies the success/failure policy,
//! and persists the result.

use crate::codec::JsonCodec;
use crate::job::{Job, JobOutput, JobStatus};
use crate::store::Store;
use crate::worker::Worker;
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type SuccessCallback = Arc<dyn Fn(Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type FailureCallback =
    Arc<dyn Fn(Job, Arc<anyhow::Error>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Errors `Handler::handle` can return. A callback failure never means the
/// job's persisted state is wrong — the `Store::update` call that fixes the
/// job's status always runs first.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] crate::error::StoreError),
    #[error("{0} callback failed: {1}")]
    Callback(&'static str, #[source] anyhow::Error),
}

pub struct Handler {
    store: Arc<dyn Store>,
    worker: Arc<dyn Worker>,
    codec: Arc<JsonCodec>,
    timeout: Duration,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl Handler {
    pub fn new(
        store: Arc<dyn Store>,
        worker: Arc<dyn Worker>,
        codec: Arc<JsonCodec>,
        timeout: Duration,
        on_success: Option<SuccessCallback>,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        Handler {
            store,
            worker,
            codec,
            timeout,
            on_success,
            on_failure,
        }
    }

    /// Runs the claimed `job` to completion: exactly one of `success` /
    /// `failure` fires, and the job is always persisted before any
    /// registered callback runs.
    pub async fn handle(&self, job: Job) -> Result<(), HandlerError> {
        match tokio::time::timeout(self.timeout, self.worker.execute(&job)).await {
            Ok(Ok(output)) => self.success(job, output).await,
            Ok(Err(err)) => self.failure(job, err).await,
            Err(_elapsed) => {
                self.failure(
                    job,
                    anyhow::anyhow!("job exceeded timeout of {:?}", self.timeout),
                )
                .await
            }
        }
    }

    async fn success(&self, mut job: Job, output: Option<JobOutput>) -> Result<(), HandlerError> {
        job.set_status(JobStatus::Completed);
        if let Some(out) = &output {
            // Encoding failure still completes the job; it's recorded as
            // `last_error` instead of blocking persistence.
            if let Err(e) = job.set_result(&*self.codec, Some(out)) {
                tracing::warn!(job_id = %job.id, error = %e, "failed to encode job result");
                job.set_last_error(e);
            }
        }
        self.store.update(&job).await?;
        tracing::info!(job_id = %job.id, queue = %job.queue_name, "job completed");

        if let Some(cb) = &self.on_success {
            if let Err(e) = cb(job.clone()).await {
                return Err(HandlerError::Callback("success", e));
            }
        }
        Ok(())
    }

    async fn failure(&self, mut job: Job, err: anyhow::Error) -> Result<(), HandlerError> {
        job.set_last_error(&err);

        if job.should_retry() {
            let retry_at = Utc::now()
                + chrono::Duration::from_std(job.retry_interval).unwrap_or_else(|_| chrono::Duration::zero());
            job.schedule_retry(retry_at);
            tracing::warn!(
                job_id = %job.id,
                queue = %job.queue_name,
                retry_count = job.retry_count,
                error = %err,
                "job failed, scheduled for retry"
            );
            self.store.update(&job).await?;
            return Ok(());
        }

        job.set_status(JobStatus::Failed);
        tracing::error!(
            job_id = %job.id,
            queue = %job.queue_name,
            error = %err,
            "job exhausted retries"
        );
        self.store.update(&job).await?;

        if let Some(cb) = &self.on_failure {
            let shared = Arc::new(err);
            if let Err(e) = cb(job.clone(), shared).await {
                return Err(HandlerError::Callback("failure", e));
            }
        }
        Ok(())
    }
}
