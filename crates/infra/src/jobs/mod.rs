//! Job record storage.
//!
//! ## Components
//!
//! - `JobStore`: keyed job storage with a guarded status write
//! - `InMemoryJobStore`: tests/dev
//! - `PostgresJobStore`: durable storage on Postgres
//! - `JobUpdate`, `ListQuery`, `JobPage`: write payloads and paging

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{ErrorUpdate, JobPage, JobUpdate, ListQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
