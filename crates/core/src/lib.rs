//! `jobflow-core`: job model and lifecycle rules.
//!
//! This crate contains **pure domain** logic (no IO, no async): the `Job`
//! record, its status/type enumerations and the state machine that decides
//! which status changes are legal.

pub mod error;
pub mod id;
pub mod job;
pub mod lifecycle;

pub use error::{TransitionError, ValidationError};
pub use id::JobId;
pub use job::{Job, JobConfig, JobStatus, JobType, MAX_RETRIES};
pub use lifecycle::{can_transition, JobEvent, Transition};
