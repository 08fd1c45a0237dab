//! Error taxonomy for the queue.
//!
//! Infrastructure errors (storage, encoding outside a worker boundary) are
//! `thiserror`-derived so callers can match on them; the user worker's own
//! error type is carried as `anyhow::Error`, wrapping whatever the worker
//! function returned, since the queue has no way to know its shape.

use thiserror::Error;

/// Errors surfaced by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row satisfied the query. Not an error to the `Poller` loop, which
    /// treats it as "queue empty".
    #[error("job not found")]
    NotFound,

    /// `Create` hit a primary-key collision.
    #[error("duplicate job id")]
    DuplicateId,

    /// Opaque payload failed to encode.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// Opaque payload failed to decode.
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// Anything the backend itself raised (driver error, pool exhaustion,
    /// constraint violation other than the ones above).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Errors surfaced by the public [`crate::client::Client`] facade.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of running a registered worker function. The worker's own error
/// type is erased to `anyhow::Error`; the handler never needs to inspect it,
/// only to stringify it into `last_error` and decide retry vs. terminal
/// failure.
pub type WorkerResult<T> = Result<T, anyhow::Error>;

/// The shared fan-in sink for infrastructure errors: every Poller/Reaper
/// reports into this channel, which is drained into a user-supplied error
/// handler. Unbounded because a Poller/Reaper must never block on a slow
/// error consumer.
pub type ErrorSink = tokio::sync::mpsc::UnboundedSender<anyhow::Error>;
