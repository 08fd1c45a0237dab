//! Runs a `call_api` worker against a Postgres-backed queue: fetch the
//! DSN and a few knobs from the environment, register one worker, run
//! until Ctrl-C, shut down gracefully.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use skiplock_core::{Client, JobOutput, RegisterOptions};
use skiplock_postgres::PgStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CallApiArgs {
    url: String,
    method: String,
    body: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CallApiResult {
    status_code: u16,
}

async fn call_api(job: skiplock_core::Job, http: reqwest::Client) -> anyhow::Result<Option<JobOutput>> {
    let args: CallApiArgs = job.parse_arguments(&skiplock_core::JsonCodec)?;

    tracing::info!(job_id = %job.id, url = %args.url, "started webhook request");

    let method = args.method.parse::<reqwest::Method>().context("invalid HTTP method")?;
    let response = http.request(method, &args.url).json(&args.body).send().await?;
    let status_code = response.status().as_u16();

    tracing::info!(job_id = %job.id, status_code, "finished webhook request");

    Ok(Some(JobOutput::new(CallApiResult { status_code })))
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

    let store = Arc::new(PgStore::new(pool));
    let client = Arc::new(Client::new(store));

    let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;

    client.register_fn(
        "call_api",
        move |job| call_api(job, http.clone()),
        RegisterOptions::new().instances(4).timeout(Duration::from_secs(15)),
    );

    let running = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    client.stop();
    running.await.context("worker pool task panicked")?;

    Ok(())
}
