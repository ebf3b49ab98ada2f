//! Job creation and read paths.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jobflow_core::{Job, JobConfig, JobId, JobType, ValidationError};
use jobflow_events::{encode, MessageBus, WorkMessage, JOBS_TOPIC};

use crate::jobs::{JobPage, JobStore, ListQuery};

use super::error::ServiceError;

/// Request to create a job. `job_type` is validated, not trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub config: Option<JobConfig>,
}

impl CreateJobRequest {
    pub fn new(name: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_type: job_type.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Checks run in order: name, then job type.
    pub fn validate(&self) -> Result<JobType, ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("name", "job name is required"));
        }
        self.job_type.parse()
    }
}

/// Validates, persists and announces new jobs; serves job reads.
#[derive(Debug, Clone)]
pub struct IngestionService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> IngestionService<S, B>
where
    S: JobStore,
    B: MessageBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    /// Create a pending job and publish it to the work topic.
    ///
    /// A publish failure is logged and does not fail the call: the job is
    /// already durable and stays pending.
    pub async fn submit(&self, request: CreateJobRequest) -> Result<Job, ServiceError> {
        let job_type = request.validate()?;
        let job = Job::new(request.name, job_type, request.config);

        self.store.create(&job).await?;
        info!(job_id = %job.id, job_type = %job.job_type, "job created");

        publish_work(&self.bus, &job).await;
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, ServiceError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::JobNotFound(id))
    }

    /// Newest jobs first. Out-of-range paging values are normalized.
    pub async fn list(&self, query: ListQuery) -> Result<JobPage, ServiceError> {
        let (page, limit) = query.normalize();
        let (jobs, total) = self.store.list(page, limit).await?;
        Ok(JobPage {
            jobs,
            total,
            page,
            limit,
        })
    }
}

/// Best-effort publish of `job` to the work topic.
pub(crate) async fn publish_work<B: MessageBus>(bus: &B, job: &Job) {
    let payload = match encode(&WorkMessage::from_job(job)) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "failed to encode work message");
            return;
        }
    };

    if let Err(e) = bus.publish(JOBS_TOPIC, payload).await {
        warn!(job_id = %job.id, error = %e, "failed to publish work message; job stays pending");
    }
}
