//! `genflow-worker` -- generation worker daemon.
//!
//! Claims queued generation jobs, submits them to the serverless
//! inference endpoint, uploads finished artifacts to object storage,
//! and records outcomes on the queue.
//!
//! # Environment variables
//!
//! | Variable              | Required | Description                          |
//! |-----------------------|----------|--------------------------------------|
//! | `DATABASE_URL`        | yes      | Postgres connection string           |
//! | `RUNPOD_API_KEY`      | yes      | Inference endpoint bearer token      |
//! | `RUNPOD_ENDPOINT_ID`  | yes      | Inference endpoint identifier        |
//! | `S3_BUCKET`           | yes      | Artifact bucket                      |
//!
//! Worker tuning knobs are documented on
//! [`genflow_worker::WorkerConfig::from_env`].

use std::sync::Arc;

use genflow_provider::{RunPodClient, RunPodConfig};
use genflow_queue::postgres::{create_pool, run_migrations, PgJobQueue};
use genflow_queue::QueueConfig;
use genflow_storage::{S3ObjectStore, StorageConfig};
use genflow_worker::{Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genflow_worker=debug,genflow_queue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        tracing::error!("DATABASE_URL environment variable is required");
        std::process::exit(1);
    });

    let provider_config = RunPodConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid provider configuration");
        std::process::exit(1);
    });

    let storage_config = StorageConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid storage configuration");
        std::process::exit(1);
    });

    let pool = create_pool(&database_url).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to connect to database");
        std::process::exit(1);
    });
    if let Err(e) = run_migrations(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    let provider = RunPodClient::new(provider_config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to build provider client");
        std::process::exit(1);
    });

    let worker = Worker::new(
        Arc::new(PgJobQueue::new(pool, QueueConfig::from_env())),
        Arc::new(provider),
        Arc::new(S3ObjectStore::from_config(storage_config).await),
        WorkerConfig::from_env(),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    worker.run(cancel).await;
}
