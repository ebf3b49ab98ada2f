//! Application services: job ingestion, reads, cancel and retry.
//!
//! Services are generic over the store and bus so tests can run them on the
//! in-memory implementations and processes can inject durable ones.

pub mod control;
pub mod error;
pub mod ingestion;

pub use control::ControlService;
pub use error::{ErrorKind, ServiceError};
pub use ingestion::{CreateJobRequest, IngestionService};
