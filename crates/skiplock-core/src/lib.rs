//! Backend-agnostic core of a transactional, Postgres-shaped job queue:
//! the job state machine, the claim/poll protocol, the retry policy, the
//! reaper, the registry, the supervisor, the public client facade, and a
//! secondary DAG executor for chaining jobs together.
//!
//! Nothing in this crate talks to a database directly — `Store` is the seam
//! a concrete backend (see `skiplock-postgres`) plugs into, keeping the
//! runtime separate from any particular storage engine.

pub mod client;
pub mod codec;
pub mod dag;
pub mod error;
pub mod handler;
pub mod job;
pub mod poller;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use client::{Client, ClientOptions, ScheduleOptions};
pub use codec::{JsonCodec, PayloadCodec};
pub use dag::{ConditionFn, Dag, DagError, Edge, Node, NodeFn};
pub use error::{ClientError, ErrorSink, StoreError, WorkerResult};
pub use handler::{FailureCallback, Handler, HandlerError, SuccessCallback};
pub use job::{Job, JobOutput, JobStatus};
pub use poller::Poller;
pub use queue::Queue;
pub use reaper::Reaper;
pub use registry::{QueueConfig, RegisterOptions, Registry};
pub use store::Store;
pub use supervisor::Supervisor;
pub use worker::{FnWorker, Worker};
