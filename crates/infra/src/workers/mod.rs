//! Background consumers of the work and cancellation topics.
//!
//! Each consumer runs as a tokio task and is controlled through a
//! [`WorkerHandle`]. Handlers are idempotent: every status change is a guarded
//! write, so redelivered messages modify nothing.

pub mod cancellation_worker;
pub mod handle;
pub mod job_worker;
pub mod processor;

pub use cancellation_worker::{CancellationStats, CancellationWorker};
pub use handle::WorkerHandle;
pub use job_worker::{JobWorker, WorkerStats};
pub use processor::{
    JobProcessor, JobResult, SimulatedProcessor, SimulationConfig, SIMULATED_FAILURE_MESSAGE,
};
