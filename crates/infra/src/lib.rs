//! Infrastructure layer: job storage, message transport, services, consumers, config.

pub mod config;
pub mod event_bus;
pub mod jobs;
pub mod services;
pub mod workers;


pub use config::{AppConfig, Backend, ConfigError, WorkerConfig};
pub use jobs::{
    ErrorUpdate, InMemoryJobStore, JobPage, JobStore, JobStoreError, JobUpdate, ListQuery,
    PostgresJobStore,
};
pub use services::{ControlService, CreateJobRequest, ErrorKind, IngestionService, ServiceError};
pub use workers::{
    CancellationStats, CancellationWorker, JobProcessor, JobResult, JobWorker, SimulatedProcessor,
    SimulationConfig, WorkerHandle, WorkerStats,
};
