//! Spawns pollers + reapers per registered queue, fans in their errors, and
//! coordinates orderly shutdown.

use crate::codec::JsonCodec;
use crate::handler::Handler;
use crate::poller::Poller;
use crate::queue::Queue;
use crate::reaper::Reaper;
use crate::registry::Registry;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

pub struct Supervisor {
    store: Arc<dyn Store>,
    codec: Arc<JsonCodec>,
    sleep_interval: Duration,
    reaper_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn Store>,
        codec: Arc<JsonCodec>,
        sleep_interval: Duration,
        reaper_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Supervisor {
            store,
            codec,
            sleep_interval,
            reaper_interval,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Cancels every Poller/Reaper at their next cancellation check. Safe to
    /// call more than once, and safe to call before `start` ever runs.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawns `instances` Pollers and one Reaper per registered queue, spawns
    /// the error-drain task, then blocks until `stop()` unblocks every
    /// spawned task. Infrastructure errors reported by a Poller or Reaper
    /// never end this call on their own — only `stop()` does. Infrastructure
    /// failures are reported to `error_handler`, not treated as fatal.
    pub async fn start(&self, registry: &Registry, error_handler: Arc<dyn Fn(anyhow::Error) + Send + Sync>) {
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<anyhow::Error>();
        let mut tasks = JoinSet::new();

        if registry.is_empty() {
            tracing::warn!("supervisor starting with no registered queues");
        }

        for (name, config) in registry.entries() {
            let queue = Queue::new(self.store.clone(), name.clone());

            for instance in 0..config.instances {
                let handler = Handler::new(
                    self.store.clone(),
                    config.worker.clone(),
                    self.codec.clone(),
                    config.timeout,
                    config.on_success.clone(),
                    config.on_failure.clone(),
                );
                let poller = Poller::new(queue.clone(), handler, self.sleep_interval);
                let shutdown_rx = self.shutdown_rx.clone();
                let errs = err_tx.clone();
                tracing::info!(queue = %name, instance, "spawning poller");
                tasks.spawn(async move { poller.run(shutdown_rx, errs).await });
            }

            let reaper = Reaper::new(queue, self.reaper_interval, config.timeout);
            let shutdown_rx = self.shutdown_rx.clone();
            let errs = err_tx.clone();
            tracing::info!(queue = %name, "spawning reaper");
            tasks.spawn(async move { reaper.run(shutdown_rx, errs).await });
        }

        // Drop our own sender so the channel closes once every spawned
        // task's clone has also been dropped, i.e. once every task exits.
        drop(err_tx);

        let drain = tokio::spawn(async move {
            while let Some(err) = err_rx.recv().await {
                error_handler(err);
            }
        });

        while tasks.join_next().await.is_some() {}
        let _ = drain.await;
    }
}
