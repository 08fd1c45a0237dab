//! The persisted job record and its pure value operations.
//!
//! `Job` is a snapshot: mutator methods here never talk to the store, they
//! only compute the next in-memory value. Only a [`crate::store::Store::update`]
//! call makes a mutation durable.

use crate::codec::PayloadCodec;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a job: `scheduled` → `initialized` →
/// `{completed | failed | scheduled (retry) | canceled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Initialized,
    Scheduled,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// The string stored in the `status` column / Postgres enum.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initialized => "initialized",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "initialized" => JobStatus::Initialized,
            "scheduled" => JobStatus::Scheduled,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "canceled" => JobStatus::Canceled,
            _ => return None,
        })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type-erased worker return value. Workers for different queues return
/// different result types, so the handler can't name a concrete `T` —
/// `erased_serde` lets it encode whatever came back without one.
pub struct JobOutput(Box<dyn erased_serde::Serialize + Send>);

impl JobOutput {
    pub fn new<T: serde::Serialize + Send + 'static>(value: T) -> Self {
        JobOutput(Box::new(value))
    }

    pub(crate) fn encode(&self, codec: &impl PayloadCodec) -> Result<Vec<u8>, StoreError> {
        codec.encode_erased(&*self.0)
    }
}

impl fmt::Debug for JobOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobOutput(..)")
    }
}

/// One row of the job table.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub queue_name: String,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub max_retry: i32,
    pub arguments: Vec<u8>,
    pub result: Option<Vec<u8>>,
    pub retry_interval: Duration,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Construct a freshly-scheduled job, ready for `Store::create`.
    pub fn new(id: impl Into<String>, queue_name: impl Into<String>, arguments: Vec<u8>) -> Self {
        let now = Utc::now();
        Job {
            id: id.into(),
            queue_name: queue_name.into(),
            status: JobStatus::Scheduled,
            last_error: None,
            retry_count: 0,
            max_retry: 0,
            arguments,
            result: None,
            retry_interval: Duration::from_secs(0),
            scheduled_at: now,
            started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while there are retries left: `retry_count < max_retry`.
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retry
    }

    /// `t` is already the intended retry instant — the `Handler` computes
    /// `now() + retry_interval` before calling this — so it is written
    /// through unmodified rather than having `retry_interval` added again.
    pub fn schedule_retry(&mut self, t: DateTime<Utc>) {
        self.retry_count += 1;
        self.scheduled_at = t;
        self.status = JobStatus::Scheduled;
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub fn set_last_error(&mut self, err: impl fmt::Display) {
        self.last_error = Some(err.to_string());
    }

    /// A `None` value leaves the stored result bytes untouched.
    pub fn set_result(
        &mut self,
        codec: &impl PayloadCodec,
        value: Option<&JobOutput>,
    ) -> Result<(), StoreError> {
        if let Some(v) = value {
            self.result = Some(v.encode(codec)?);
        }
        Ok(())
    }

    pub fn set_args<T: serde::Serialize>(
        &mut self,
        codec: &impl PayloadCodec,
        value: Option<&T>,
    ) -> Result<(), StoreError> {
        if let Some(v) = value {
            self.arguments = codec.encode(v)?;
        }
        Ok(())
    }

    /// Decodes `arguments` into a caller-chosen type.
    pub fn parse_arguments<T: DeserializeOwned>(
        &self,
        codec: &impl PayloadCodec,
    ) -> Result<T, StoreError> {
        codec.decode(&self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn should_retry_respects_max() {
        let mut j = Job::new("a", "q", b"{}".to_vec());
        j.max_retry = 2;
        assert!(j.should_retry());
        j.retry_count = 2;
        assert!(!j.should_retry());
    }

    #[test]
    fn schedule_retry_does_not_double_add_interval() {
        let mut j = Job::new("a", "q", b"{}".to_vec());
        j.retry_interval = Duration::from_secs(30);
        let retry_at = Utc::now() + chrono::Duration::seconds(30);
        j.schedule_retry(retry_at);
        assert_eq!(j.scheduled_at, retry_at);
        assert_eq!(j.retry_count, 1);
        assert_eq!(j.status.as_str(), "scheduled");
    }

    #[test]
    fn parse_arguments_round_trips() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Args {
            x: i32,
        }
        let codec = JsonCodec;
        let mut j = Job::new("a", "q", vec![]);
        j.set_args(&codec, Some(&Args { x: 1 })).unwrap();
        let parsed: Args = j.parse_arguments(&codec).unwrap();
        assert_eq!(parsed, Args { x: 1 });
    }

    #[test]
    fn set_result_none_is_noop() {
        let codec = JsonCodec;
        let mut j = Job::new("a", "q", vec![]);
        j.set_result(&codec, None).unwrap();
        assert!(j.result.is_none());
    }

    #[test]
    fn set_result_some_encodes_via_codec() {
        let codec = JsonCodec;
        let mut j = Job::new("a", "q", vec![]);
        let out = JobOutput::new(serde_json::json!({"ok": true}));
        j.set_result(&codec, Some(&out)).unwrap();
        let stored: serde_json::Value = serde_json::from_slice(&j.result.unwrap()).unwrap();
        assert_eq!(stored, serde_json::json!({"ok": true}));
    }
}
