//! Long-running claim → handle loop.

use crate::error::{ErrorSink, StoreError};
use crate::handler::Handler;
use crate::queue::Queue;
use std::time::Duration;
use tokio::sync::watch;

pub struct Poller {
    queue: Queue,
    handler: Handler,
    sleep_interval: Duration,
}

impl Poller {
    pub fn new(queue: Queue, handler: Handler, sleep_interval: Duration) -> Self {
        Poller {
            queue,
            handler,
            sleep_interval,
        }
    }

    /// Runs until `shutdown` reports `true`. Intentionally busy when the
    /// queue is non-empty: there is no sleep between a successful claim and
    /// the next poll attempt, only on an empty queue.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, errors: ErrorSink) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let claimed = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                res = self.queue.poll() => res,
            };

            match claimed {
                Err(StoreError::NotFound) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(self.sleep_interval) => {}
                    }
                }
                Err(e) => {
                    let _ = errors.send(e.into());
                }
                Ok(job) => {
                    tracing::debug!(job_id = %job.id, queue = %self.queue.name(), "claimed job");
                    if let Err(e) = self.handler.handle(job).await {
                        let _ = errors.send(e.into());
                    }
                }
            }
        }
    }
}
