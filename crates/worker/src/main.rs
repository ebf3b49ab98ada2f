//! Standalone consumer process for the persistent backend.
//!
//! Runs the job worker and the cancellation consumer against Postgres and
//! Redis Streams until ctrl-c, then stops both and logs their counters.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;

use jobflow_infra::event_bus::RedisStreamsBus;
use jobflow_infra::{
    AppConfig, Backend, CancellationWorker, JobWorker, PostgresJobStore, SimulatedProcessor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobflow_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let Backend::Persistent {
        database_url,
        redis_url,
    } = &config.backend
    else {
        bail!("jobflow-worker needs the persistent backend; set USE_PERSISTENT_STORES=true");
    };

    let pool = sqlx::PgPool::connect(database_url)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PostgresJobStore::new(pool));
    store.ensure_schema().await?;

    let bus = Arc::new(
        RedisStreamsBus::new(redis_url)?.with_consumer_name(config.worker.consumer_name.clone()),
    );

    let shutdown = CancellationToken::new();
    let jobs = JobWorker::spawn(
        store.clone(),
        bus.clone(),
        SimulatedProcessor::new(config.worker.simulation.clone()),
        shutdown.clone(),
    )
    .await?;
    let cancellations = CancellationWorker::spawn(store, bus, shutdown.clone()).await?;

    tracing::info!(consumer = %config.worker.consumer_name, "workers running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    shutdown.cancel();

    let job_stats = jobs.shutdown().await;
    let cancellation_stats = cancellations.shutdown().await;
    tracing::info!(jobs = ?job_stats, cancellations = ?cancellation_stats, "workers stopped");

    Ok(())
}
