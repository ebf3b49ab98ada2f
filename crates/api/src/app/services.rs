//! Infrastructure wiring for the HTTP front door.
//!
//! - In-memory backend: store and bus live in this process, and so do the
//!   job and cancellation consumers
//! - Persistent backend: Postgres store and Redis Streams bus; consumers run in
//!   the separate `jobflow-worker` process

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobflow_events::{BusError, InMemoryMessageBus, MessageBus};
use jobflow_infra::event_bus::RedisStreamsBus;
use jobflow_infra::{
    AppConfig, Backend, CancellationStats, CancellationWorker, ControlService, InMemoryJobStore,
    IngestionService, JobStore, JobStoreError, JobWorker, PostgresJobStore, SimulatedProcessor,
    WorkerConfig, WorkerHandle, WorkerStats,
};

pub type DynStore = Arc<dyn JobStore>;
pub type DynBus = Arc<dyn MessageBus>;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Consumers running inside the API process (in-memory backend only).
#[derive(Debug)]
struct EmbeddedWorkers {
    jobs: WorkerHandle<WorkerStats>,
    cancellations: WorkerHandle<CancellationStats>,
}

pub struct AppServices {
    pub ingestion: IngestionService<DynStore, DynBus>,
    pub control: ControlService<DynStore, DynBus>,
    workers: Mutex<Option<EmbeddedWorkers>>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices").finish_non_exhaustive()
    }
}

impl AppServices {
    fn new(store: DynStore, bus: DynBus, workers: Option<EmbeddedWorkers>) -> Self {
        Self {
            ingestion: IngestionService::new(store.clone(), bus.clone()),
            control: ControlService::new(store, bus),
            workers: Mutex::new(workers),
        }
    }

    /// Stop embedded consumers, if any. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(workers) = self.workers.lock().await.take() {
            let jobs = workers.jobs.shutdown().await;
            let cancellations = workers.cancellations.shutdown().await;
            info!(?jobs, ?cancellations, "embedded workers stopped");
        }
    }
}

/// Wire services for `config.backend`.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    match &config.backend {
        Backend::InMemory => in_memory(&config.worker).await,
        Backend::Persistent {
            database_url,
            redis_url,
        } => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let store = PostgresJobStore::new(pool);
            store.ensure_schema().await?;

            let bus = RedisStreamsBus::new(redis_url)?
                .with_consumer_name(config.worker.consumer_name.clone());

            info!("using Postgres job store and Redis Streams bus");
            Ok(AppServices::new(Arc::new(store), Arc::new(bus), None))
        }
    }
}

/// In-memory store and bus with embedded consumers.
pub async fn in_memory(worker: &WorkerConfig) -> Result<AppServices, BootstrapError> {
    let store: DynStore = InMemoryJobStore::arc();
    let bus: DynBus = InMemoryMessageBus::arc();
    let shutdown = CancellationToken::new();

    let jobs = JobWorker::spawn(
        store.clone(),
        bus.clone(),
        SimulatedProcessor::new(worker.simulation.clone()),
        shutdown.clone(),
    )
    .await?;
    let cancellations = CancellationWorker::spawn(store.clone(), bus.clone(), shutdown).await?;

    info!("using in-memory job store and bus with embedded workers");
    Ok(AppServices::new(
        store,
        bus,
        Some(EmbeddedWorkers {
            jobs,
            cancellations,
        }),
    ))
}
