//! Maps queue-name → worker configuration.

use crate::handler::{FailureCallback, SuccessCallback};
use crate::worker::Worker;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_INSTANCES: usize = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct QueueConfig {
    pub worker: Arc<dyn Worker>,
    pub instances: usize,
    pub timeout: Duration,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
}

/// Builder for the options accepted by [`Registry::register`]: instance
/// count, per-job timeout, and optional success/failure callbacks.
pub struct RegisterOptions {
    instances: usize,
    timeout: Duration,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        RegisterOptions {
            instances: DEFAULT_INSTANCES,
            timeout: DEFAULT_TIMEOUT,
            on_success: None,
            on_failure: None,
        }
    }
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instances(mut self, n: usize) -> Self {
        self.instances = n.max(1);
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    pub fn on_success(mut self, cb: SuccessCallback) -> Self {
        self.on_success = Some(cb);
        self
    }

    pub fn on_failure(mut self, cb: FailureCallback) -> Self {
        self.on_failure = Some(cb);
        self
    }
}

/// Read-only once the supervisor has started; registration itself is backed
/// by a `DashMap` so a host that registers queues from more than one thread
/// still gets correct results, even though registration in practice happens
/// single-threaded before `start`.
#[derive(Default)]
pub struct Registry {
    queues: DashMap<String, QueueConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            queues: DashMap::new(),
        }
    }

    /// Registering the same queue name twice overwrites the earlier
    /// registration (last writer wins), logged so the clobber is at least
    /// visible.
    pub fn register(&self, name: impl Into<String>, worker: Arc<dyn Worker>, opts: RegisterOptions) {
        let name = name.into();
        if self.queues.contains_key(&name) {
            tracing::warn!(queue = %name, "overwriting existing queue registration");
        }
        self.queues.insert(
            name,
            QueueConfig {
                worker,
                instances: opts.instances,
                timeout: opts.timeout,
                on_success: opts.on_success,
                on_failure: opts.on_failure,
            },
        );
    }

    pub fn entries(&self) -> Vec<(String, QueueConfig)> {
        self.queues
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
