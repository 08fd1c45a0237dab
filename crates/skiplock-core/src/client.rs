//! Public API facade: Schedule, Cancel, ScheduleNow, Get, Register, Start,
//! Stop.

use crate::codec::JsonCodec;
use crate::error::ClientError;
use crate::job::Job;
use crate::registry::{RegisterOptions, Registry};
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::worker::{FnWorker, Worker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(10);

fn default_error_handler(err: anyhow::Error) {
    tracing::error!(error = %err, "error in worker pool");
}

/// Construction options accepted by [`Client::new_with_options`].
pub struct ClientOptions {
    pub sleep_interval: Duration,
    pub reaper_interval: Duration,
    pub error_handler: Arc<dyn Fn(anyhow::Error) + Send + Sync>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            error_handler: Arc::new(default_error_handler),
        }
    }
}

/// Options accepted by [`Client::schedule`]: max retry count, the delay
/// between retries, and an optional future schedule time.
#[derive(Default)]
pub struct ScheduleOptions {
    max_retries: i32,
    retry_interval: Duration,
    schedule_time: Option<DateTime<Utc>>,
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, n: i32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn retry_interval(mut self, d: Duration) -> Self {
        self.retry_interval = d;
        self
    }

    pub fn schedule_time(mut self, t: DateTime<Utc>) -> Self {
        self.schedule_time = Some(t);
        self
    }

    fn apply(&self, job: &mut Job) {
        job.max_retry = self.max_retries;
        job.retry_interval = self.retry_interval;
        if let Some(t) = self.schedule_time {
            job.scheduled_at = t;
        }
    }
}

/// The embeddable client: owns a pluggable [`Store`], a [`Registry`] of
/// worker configurations, and the [`Supervisor`] that runs them.
pub struct Client {
    store: Arc<dyn Store>,
    codec: Arc<JsonCodec>,
    registry: Registry,
    supervisor: Supervisor,
    error_handler: Arc<dyn Fn(anyhow::Error) + Send + Sync>,
}

impl Client {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::new_with_options(store, ClientOptions::default())
    }

    pub fn new_with_options(store: Arc<dyn Store>, options: ClientOptions) -> Self {
        let codec = Arc::new(JsonCodec);
        let supervisor = Supervisor::new(
            store.clone(),
            codec.clone(),
            options.sleep_interval,
            options.reaper_interval,
        );
        Client {
            store,
            codec,
            registry: Registry::new(),
            supervisor,
            error_handler: options.error_handler,
        }
    }

    /// Register a worker trait object. Must be called before [`Client::start`].
    pub fn register(&self, name: impl Into<String>, worker: Arc<dyn Worker>, opts: RegisterOptions) {
        self.registry.register(name, worker, opts);
    }

    /// Register a plain async function as a worker, avoiding the need to
    /// implement [`Worker`] for a one-off closure.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F, opts: RegisterOptions)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::WorkerResult<Option<crate::job::JobOutput>>> + Send + 'static,
    {
        self.register(name, Arc::new(FnWorker::new(f)), opts);
    }

    /// Enqueue a new job. `id` is producer-supplied and must be unique.
    pub async fn schedule<T: Serialize>(
        &self,
        id: impl Into<String>,
        queue_name: impl Into<String>,
        arguments: &T,
        opts: ScheduleOptions,
    ) -> Result<(), ClientError> {
        let mut job = Job::new(id, queue_name, Vec::new());
        job.set_args(&*self.codec, Some(arguments))
            .map_err(ClientError::Store)?;
        opts.apply(&mut job);
        self.store.create(&job).await?;
        Ok(())
    }

    /// No-op if `id` is not currently `scheduled` — a job already claimed
    /// by a worker cannot be cancelled out from under it.
    pub async fn cancel(&self, id: &str) -> Result<(), ClientError> {
        self.store.deschedule(id).await?;
        Ok(())
    }

    /// Forces immediate schedulability regardless of current status.
    pub async fn schedule_now(&self, id: &str) -> Result<(), ClientError> {
        self.store.schedule_now(id).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Job, ClientError> {
        Ok(self.store.get(id).await?)
    }

    /// Blocks until [`Client::stop`] unblocks every spawned Poller/Reaper.
    pub async fn start(&self) {
        self.supervisor.start(&self.registry, self.error_handler.clone()).await;
    }

    /// Initiates graceful shutdown; does not block on it completing.
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
