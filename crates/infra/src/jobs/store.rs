//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use jobflow_core::{Job, JobId, JobStatus};

use super::types::{ErrorUpdate, JobUpdate};

/// Durable keyed storage for jobs.
///
/// Every status change goes through [`JobStore::conditional_update_status`];
/// there is no unconditional write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn create(&self, job: &Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Page through jobs ordered by `created_at` descending.
    ///
    /// `page` is 1-based. Returns the page and the total number of jobs.
    async fn list(&self, page: u32, limit: u32) -> Result<(Vec<Job>, u64), JobStoreError>;

    /// Set `new_status` only if the job's status at write time is in `expected`.
    ///
    /// Returns the number of jobs modified: 0 when the guard did not match or
    /// the id is unknown, 1 otherwise. `updated_at` is refreshed on every
    /// modification.
    async fn conditional_update_status(
        &self,
        id: JobId,
        expected: &[JobStatus],
        new_status: JobStatus,
        update: JobUpdate,
    ) -> Result<u64, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("storage error: {0}")]
    Storage(String),

    /// A stored row could not be decoded into a job.
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

#[async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn create(&self, job: &Job) -> Result<JobId, JobStoreError> {
        (**self).create(job).await
    }

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get_by_id(id).await
    }

    async fn list(&self, page: u32, limit: u32) -> Result<(Vec<Job>, u64), JobStoreError> {
        (**self).list(page, limit).await
    }

    async fn conditional_update_status(
        &self,
        id: JobId,
        expected: &[JobStatus],
        new_status: JobStatus,
        update: JobUpdate,
    ) -> Result<u64, JobStoreError> {
        (**self)
            .conditional_update_status(id, expected, new_status, update)
            .await
    }
}

/// In-memory job store for tests/dev.
///
/// The guard check and the write happen under one write lock, which makes the
/// conditional update atomic.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job.id)
    }

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&id).cloned())
    }

    async fn list(&self, page: u32, limit: u32) -> Result<(Vec<Job>, u64), JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;

        let mut all: Vec<&Job> = jobs.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let page = all
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok((page, jobs.len() as u64))
    }

    async fn conditional_update_status(
        &self,
        id: JobId,
        expected: &[JobStatus],
        new_status: JobStatus,
        update: JobUpdate,
    ) -> Result<u64, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;

        let Some(job) = jobs.get_mut(&id) else {
            return Ok(0);
        };
        if !expected.contains(&job.status) {
            return Ok(0);
        }

        job.status = new_status;
        job.updated_at = Utc::now();
        match update.error_message {
            ErrorUpdate::Keep => {}
            ErrorUpdate::Set(message) => job.error_message = Some(message),
            ErrorUpdate::Clear => job.error_message = None,
        }
        if let Some(retry_count) = update.retry_count {
            job.retry_count = retry_count;
        }

        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobflow_core::JobType;

    fn job(name: &str) -> Job {
        Job::new(name, JobType::Process, None)
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        let id = store.create(&j).await.unwrap();

        assert_eq!(store.get_by_id(id).await.unwrap(), Some(j));
        assert_eq!(store.get_by_id(JobId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        store.create(&j).await.unwrap();

        let err = store.create(&j).await.unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(id) if id == j.id));
    }

    #[tokio::test]
    async fn guarded_write_applies_only_from_expected_status() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        store.create(&j).await.unwrap();

        let modified = store
            .conditional_update_status(
                j.id,
                &[JobStatus::Processing],
                JobStatus::Completed,
                JobUpdate::none(),
            )
            .await
            .unwrap();
        assert_eq!(modified, 0);
        assert_eq!(
            store.get_by_id(j.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );

        let modified = store
            .conditional_update_status(
                j.id,
                &[JobStatus::Pending],
                JobStatus::Processing,
                JobUpdate::none(),
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let stored = store.get_by_id(j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(stored.updated_at >= j.updated_at);
    }

    #[tokio::test]
    async fn guarded_write_sets_extra_fields_and_keeps_absent_ones() {
        let store = InMemoryJobStore::new();
        let mut j = job("a");
        j.status = JobStatus::Processing;
        store.create(&j).await.unwrap();

        store
            .conditional_update_status(
                j.id,
                &[JobStatus::Processing],
                JobStatus::Failed,
                JobUpdate::with_error("boom"),
            )
            .await
            .unwrap();
        store
            .conditional_update_status(
                j.id,
                &[JobStatus::Failed],
                JobStatus::Pending,
                JobUpdate::with_retry_count(1),
            )
            .await
            .unwrap();

        let stored = store.get_by_id(j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn unknown_id_modifies_nothing() {
        let store = InMemoryJobStore::new();
        let modified = store
            .conditional_update_status(
                JobId::new(),
                &JobStatus::ALL,
                JobStatus::Cancelled,
                JobUpdate::none(),
            )
            .await
            .unwrap();
        assert_eq!(modified, 0);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let store = InMemoryJobStore::new();
        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut j = job(&format!("job-{i}"));
            j.created_at = base + Duration::seconds(i);
            ids.push(j.id);
            store.create(&j).await.unwrap();
        }

        let (first, total) = store.list(1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(
            first.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![ids[4], ids[3]]
        );

        let (last, _) = store.list(3, 2).await.unwrap();
        assert_eq!(last.iter().map(|j| j.id).collect::<Vec<_>>(), vec![ids[0]]);

        let (beyond, total) = store.list(9, 2).await.unwrap();
        assert!(beyond.is_empty());
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn guarded_write_can_clear_the_error() {
        let store = InMemoryJobStore::new();
        let mut j = job("a");
        j.status = JobStatus::Processing;
        j.error_message = Some("from an earlier attempt".into());
        store.create(&j).await.unwrap();

        store
            .conditional_update_status(
                j.id,
                &[JobStatus::Processing],
                JobStatus::Completed,
                JobUpdate::clear_error(),
            )
            .await
            .unwrap();

        let stored = store.get_by_id(j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error_message.is_none());
    }
}
