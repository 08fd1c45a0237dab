//! Schedules a batch of `call_api` webhook jobs against a Postgres-backed
//! queue, capping how many `Schedule` calls are in flight at once.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use skiplock_core::{Client, ScheduleOptions};
use skiplock_postgres::PgStore;
use std::sync::Arc;
use uuid::Uuid;

const JOB_COUNT: usize = 1000;
const MAX_IN_FLIGHT: usize = 10;

#[derive(Serialize)]
struct CallApiArgs {
    url: String,
    method: String,
    body: SignupPayload,
}

#[derive(Serialize)]
struct SignupPayload {
    name: String,
    email: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dsn = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&dsn)
        .await
        .context("failed to connect to postgres")?;

    let client = Arc::new(Client::new(Arc::new(PgStore::new(pool))));

    let results: Vec<Result<()>> = stream::iter(0..JOB_COUNT)
        .map(|i| {
            let client = client.clone();
            async move {
                let args = CallApiArgs {
                    url: "http://localhost:3001/v4/upsert".to_string(),
                    method: "POST".to_string(),
                    body: SignupPayload {
                        name: "John".to_string(),
                        email: format!("john+{i}@example.com"),
                    },
                };
                client
                    .schedule(Uuid::new_v4().to_string(), "call_api", &args, ScheduleOptions::new().max_retries(3))
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .buffer_unordered(MAX_IN_FLIGHT)
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        for err in results.into_iter().filter_map(Result::err) {
            tracing::error!(error = %err, "failed to schedule job");
        }
        anyhow::bail!("{failed} of {JOB_COUNT} jobs failed to schedule");
    }

    tracing::info!(count = JOB_COUNT, "done");
    Ok(())
}
