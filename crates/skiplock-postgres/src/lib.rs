//! PostgreSQL implementation of the skiplock job store.
//!
//! # Features
//!
//! - `FOR UPDATE SKIP LOCKED` claim queries so concurrent pollers never block
//!   each other or double-claim a row
//! - Crash-safe stall reclaim via `requeue_timeout`
//! - A scoped-transaction primitive so a producer can enqueue a job in the
//!   same database transaction as the rest of its own write, with guaranteed
//!   commit-or-rollback
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id             TEXT PRIMARY KEY,
//!     queue_name     TEXT NOT NULL,
//!     status         TEXT NOT NULL,
//!     last_error     TEXT,
//!     retry_count    INTEGER NOT NULL DEFAULT 0,
//!     max_retry      INTEGER NOT NULL DEFAULT 0,
//!     arguments      BYTEA NOT NULL,
//!     result         BYTEA,
//!     retry_interval_ms BIGINT NOT NULL DEFAULT 0,
//!     scheduled_at   TIMESTAMPTZ NOT NULL,
//!     started_at     TIMESTAMPTZ,
//!     created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE INDEX idx_jobs_claimable ON jobs (queue_name, scheduled_at)
//!     WHERE status = 'scheduled';
//! CREATE INDEX idx_jobs_stalled ON jobs (queue_name, started_at)
//!     WHERE status = 'initialized';
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use skiplock_postgres::PgStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/mydb").await?;
//! let store = PgStore::new(pool);
//! let client = skiplock_core::Client::new(std::sync::Arc::new(store));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use skiplock_core::{Job, JobStatus, Store, StoreError};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;

const DEFAULT_TABLE: &str = "jobs";

const COLUMNS: &str = "id, queue_name, status, last_error, retry_count, max_retry, \
     arguments, result, retry_interval_ms, scheduled_at, started_at, created_at, updated_at";

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<Job, StoreError> {
    let status_raw: String = row.try_get("status").map_err(backend)?;
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("unknown job status `{status_raw}`")))?;
    let retry_interval_ms: i64 = row.try_get("retry_interval_ms").map_err(backend)?;

    Ok(Job {
        id: row.try_get("id").map_err(backend)?,
        queue_name: row.try_get("queue_name").map_err(backend)?,
        status,
        last_error: row.try_get("last_error").map_err(backend)?,
        retry_count: row.try_get("retry_count").map_err(backend)?,
        max_retry: row.try_get("max_retry").map_err(backend)?,
        arguments: row.try_get("arguments").map_err(backend)?,
        result: row.try_get("result").map_err(backend)?,
        retry_interval: Duration::from_millis(retry_interval_ms.max(0) as u64),
        scheduled_at: row.try_get("scheduled_at").map_err(backend)?,
        started_at: row.try_get("started_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.into())
}

fn map_fetch_optional(row: Option<sqlx::postgres::PgRow>) -> Result<Job, StoreError> {
    match row {
        Some(r) => row_to_job(r),
        None => Err(StoreError::NotFound),
    }
}

/// Validates `name` is a bare SQL identifier — table names are interpolated
/// into the query text (Postgres has no way to bind an identifier as a
/// parameter), so this is the only thing standing between a misconfigured
/// table name and a broken query, not untrusted user input.
fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::Backend(anyhow::anyhow!(
            "`{name}` is not a valid table name"
        )))
    }
}

/// PostgreSQL-backed [`Store`]. Cheap to clone: cloning shares the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    table_name: String,
}

impl PgStore {
    /// Uses the default `jobs` table name.
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            pool,
            table_name: DEFAULT_TABLE.to_string(),
        }
    }

    /// Same as [`PgStore::new`] but against a non-default table, for hosts
    /// that run more than one queue table in the same database.
    pub fn with_table_name(pool: PgPool, table_name: impl Into<String>) -> Result<Self, StoreError> {
        let table_name = table_name.into();
        validate_identifier(&table_name)?;
        Ok(PgStore { pool, table_name })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs `f` against a fresh transaction, committing on `Ok` and rolling
    /// back on `Err`. This is the seam a producer uses to enqueue a job in
    /// the same transaction as the rest of its own write (the outbox
    /// pattern): call [`PgStore::scope`] inside `f` to get a `Store`-shaped
    /// view bound to that transaction.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(backend)?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Borrows an in-flight transaction as a `Store`-shaped scope sharing
    /// this store's table name.
    pub fn scope<'a>(&self, tx: &'a mut Transaction<'static, Postgres>) -> TxScope<'a> {
        TxScope {
            tx,
            table_name: &self.table_name,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        self.scope(&mut tx).create(job).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Job, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table_name);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        map_fetch_optional(row)
    }

    async fn search(&self, limit: i64, offset: i64, substring: &str) -> Result<Vec<Job>, StoreError> {
        let rows = if substring.is_empty() {
            let query = format!(
                "SELECT {COLUMNS} FROM {} ORDER BY scheduled_at DESC LIMIT $1 OFFSET $2",
                self.table_name
            );
            sqlx::query(&query)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
        } else {
            let query = format!(
                "SELECT {COLUMNS} FROM {} WHERE id LIKE '%' || $1 || '%' \
                 ORDER BY scheduled_at DESC LIMIT $2 OFFSET $3",
                self.table_name
            );
            sqlx::query(&query)
                .bind(substring)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(backend)?;

        rows.into_iter().map(row_to_job).collect()
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        self.scope(&mut tx).update(job).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn deschedule(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        self.scope(&mut tx).deschedule(id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn schedule_now(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        self.scope(&mut tx).schedule_now(id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn poll(&self, queue: &str) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let job = self.scope(&mut tx).poll(queue).await?;
        tx.commit().await.map_err(backend)?;
        Ok(job)
    }

    async fn requeue_timeout(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let n = self.scope(&mut tx).requeue_timeout(queue, cutoff).await?;
        tx.commit().await.map_err(backend)?;
        Ok(n)
    }
}

/// A `Store`-shaped view bound to a caller-owned transaction. Not `Store`
/// itself — `Store` must be object-safe for `Arc<dyn Store>`, and a type
/// borrowing `&'a mut Transaction` can't satisfy that without a lifetime
/// parameter on the trait, so this is a concrete, backend-specific sibling
/// API used for the outbox pattern instead.
pub struct TxScope<'a> {
    tx: &'a mut Transaction<'static, Postgres>,
    table_name: &'a str,
}

impl<'a> TxScope<'a> {
    pub async fn create(&mut self, job: &Job) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO {} (id, queue_name, status, arguments, max_retry, retry_interval_ms, scheduled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table_name
        );
        sqlx::query(&query)
            .bind(&job.id)
            .bind(&job.queue_name)
            .bind(job.status.as_str())
            .bind(&job.arguments)
            .bind(job.max_retry)
            .bind(job.retry_interval.as_millis() as i64)
            .bind(job.scheduled_at)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateId,
                _ => backend(e),
            })?;
        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> Result<Job, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table_name);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut **self.tx)
            .await
            .map_err(backend)?;
        map_fetch_optional(row)
    }

    pub async fn update(&mut self, job: &Job) -> Result<(), StoreError> {
        let query = format!(
            "UPDATE {} SET status = $1, result = $2, last_error = $3, retry_count = $4, \
             scheduled_at = $5, updated_at = now() WHERE id = $6",
            self.table_name
        );
        sqlx::query(&query)
            .bind(job.status.as_str())
            .bind(&job.result)
            .bind(&job.last_error)
            .bind(job.retry_count)
            .bind(job.scheduled_at)
            .bind(&job.id)
            .execute(&mut **self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    pub async fn deschedule(&mut self, id: &str) -> Result<(), StoreError> {
        let query = format!(
            "UPDATE {} SET updated_at = now(), status = $1 WHERE id = $2 AND status = $3",
            self.table_name
        );
        sqlx::query(&query)
            .bind(JobStatus::Canceled.as_str())
            .bind(id)
            .bind(JobStatus::Scheduled.as_str())
            .execute(&mut **self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    pub async fn schedule_now(&mut self, id: &str) -> Result<(), StoreError> {
        let query = format!(
            "UPDATE {} SET updated_at = now(), scheduled_at = now(), status = $1 WHERE id = $2",
            self.table_name
        );
        sqlx::query(&query)
            .bind(JobStatus::Scheduled.as_str())
            .bind(id)
            .execute(&mut **self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    /// The claim primitive: atomically picks the oldest-scheduled claimable
    /// row of `queue`, skipping rows a concurrent poller already locked, and
    /// flips it to `initialized` in the same statement.
    pub async fn poll(&mut self, queue: &str) -> Result<Job, StoreError> {
        let query = format!(
            "WITH claimable AS ( \
                 SELECT id FROM {table} \
                 WHERE status = $1 AND scheduled_at <= now() AND queue_name = $2 \
                 ORDER BY scheduled_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE {table} SET status = $3, started_at = now(), updated_at = now() \
             WHERE id IN (SELECT id FROM claimable) \
             RETURNING {COLUMNS}",
            table = self.table_name,
        );
        let row = sqlx::query(&query)
            .bind(JobStatus::Scheduled.as_str())
            .bind(queue)
            .bind(JobStatus::Initialized.as_str())
            .fetch_optional(&mut **self.tx)
            .await
            .map_err(backend)?;
        map_fetch_optional(row)
    }

    pub async fn requeue_timeout(&mut self, queue: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = format!(
            "UPDATE {} SET status = $1, started_at = NULL, retry_count = retry_count + 1, updated_at = now() \
             WHERE started_at < $2 AND status = $3 AND queue_name = $4",
            self.table_name
        );
        let result = sqlx::query(&query)
            .bind(JobStatus::Scheduled.as_str())
            .bind(cutoff)
            .bind(JobStatus::Initialized.as_str())
            .bind(queue)
            .execute(&mut **self.tx)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_identifier_accepts_snake_case() {
        assert!(validate_identifier("jobs").is_ok());
        assert!(validate_identifier("_jobs_v2").is_ok());
    }

    #[test]
    fn validate_identifier_rejects_non_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1jobs").is_err());
        assert!(validate_identifier("jobs; DROP TABLE users;--").is_err());
        assert!(validate_identifier("jobs v2").is_err());
    }
}
