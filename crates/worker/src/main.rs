//! Worker binary: wires Postgres, the HTTP generation client, and
//! filesystem artifact storage into the engine's worker pool, then runs
//! until Ctrl-C.

mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use atelier_client::HttpGenerator;
use atelier_core::credential::CredentialKey;
use atelier_core::ratelimit::RateLimiter;
use atelier_db::store::PgJobStore;
use atelier_engine::{CancelRegistry, EngineConfig, EventBus, SubTaskExecutor, Worker, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::storage::FsArtifactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let generation_endpoint = std::env::var("GENERATION_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:8700".into());
    let artifact_dir: PathBuf = std::env::var("ARTIFACT_DIR")
        .unwrap_or_else(|_| "./artifacts".into())
        .into();
    let credential_passphrase =
        std::env::var("CREDENTIAL_KEY").context("CREDENTIAL_KEY must be set")?;

    let pool = atelier_db::create_pool(&database_url)
        .await
        .context("connecting to database")?;
    atelier_db::run_migrations(&pool)
        .await
        .context("running migrations")?;

    let store = Arc::new(PgJobStore::new(pool));
    let generator = Arc::new(
        HttpGenerator::new(generation_endpoint, config.generation_timeout)
            .map_err(|e| anyhow::anyhow!("building generation client: {e}"))?,
    );
    let artifacts = Arc::new(
        FsArtifactStore::new(artifact_dir)
            .await
            .map_err(|e| anyhow::anyhow!("preparing artifact storage: {e}"))?,
    );
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
    let key = CredentialKey::from_passphrase(&credential_passphrase);

    let executor = Arc::new(SubTaskExecutor::new(
        generator,
        artifacts,
        limiter,
        config.retry.clone(),
        key,
    ));
    let events = Arc::new(EventBus::default());
    let cancels = Arc::new(CancelRegistry::new());
    let worker = Arc::new(Worker::new(
        store.clone(),
        executor,
        events,
        cancels,
        config.prompt_concurrency,
    ));
    let worker_pool = WorkerPool::new(
        store,
        worker,
        config.worker_concurrency,
        config.poll_interval,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    worker_pool.run(shutdown).await;
    tracing::info!("Worker stopped");
    Ok(())
}
