//! Long-running stall-reclaim loop.

use crate::error::ErrorSink;
use crate::queue::Queue;
use std::time::Duration;
use tokio::sync::watch;

pub struct Reaper {
    queue: Queue,
    reaper_interval: Duration,
    worker_timeout: Duration,
}

impl Reaper {
    pub fn new(queue: Queue, reaper_interval: Duration, worker_timeout: Duration) -> Self {
        Reaper {
            queue,
            reaper_interval,
            worker_timeout,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>, errors: ErrorSink) {
        let mut ticker = tokio::time::interval(self.reaper_interval);
        ticker.tick().await; // consume the immediate first tick; we want to *wait* first

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    match self.queue.requeue_timeout(self.worker_timeout).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(
                            queue = %self.queue.name(),
                            reclaimed = n,
                            "reaper reclaimed stalled jobs"
                        ),
                        Err(e) => {
                            let _ = errors.send(e.into());
                        }
                    }
                }
            }
        }
    }
}
