//! Postgres-backed job store.
//!
//! ## Guarded Write
//!
//! `conditional_update_status` is a single statement:
//!
//! ```sql
//! UPDATE jobs SET status = $2, ... WHERE id = $1 AND status = ANY($6)
//! ```
//!
//! Postgres evaluates the `WHERE` clause against the row version it locks, so the
//! guard is checked at write time. `rows_affected()` is the modified count.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` (on insert) |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |
//! | Row decode failure | N/A | `Corrupt` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use jobflow_core::{Job, JobConfig, JobId, JobStatus, JobType};

use super::store::{JobStore, JobStoreError};
use super::types::{ErrorUpdate, JobUpdate};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id            UUID PRIMARY KEY,
        name          TEXT NOT NULL,
        job_type      TEXT NOT NULL,
        status        TEXT NOT NULL,
        config        JSONB,
        error_message TEXT,
        retry_count   INTEGER NOT NULL DEFAULT 0 CHECK (retry_count BETWEEN 0 AND 3),
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at DESC, id DESC)",
];

/// Postgres job store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `jobs` table and its index if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn create(&self, job: &Job) -> Result<JobId, JobStoreError> {
        let config = job.config.clone().map(serde_json::Value::Object);

        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, name, job_type, status, config, error_message, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.name)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(config)
        .bind(job.error_message.as_deref())
        .bind(job.retry_count as i32)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("create", e)
            }
        })?;

        Ok(job.id)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, job_type, status, config, error_message, retry_count, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_by_id", e))?;

        row.map(|r| JobRow::from_pg(&r)?.into_job()).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self, page: u32, limit: u32) -> Result<(Vec<Job>, u64), JobStoreError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let rows = sqlx::query(
            r#"
            SELECT id, name, job_type, status, config, error_message, retry_count, created_at, updated_at
            FROM jobs
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(JobRow::from_pg(row)?.into_job()?);
        }

        Ok((jobs, total.max(0) as u64))
    }

    #[instrument(
        skip(self, expected, update),
        fields(job_id = %id, new_status = %new_status),
        err
    )]
    async fn conditional_update_status(
        &self,
        id: JobId,
        expected: &[JobStatus],
        new_status: JobStatus,
        update: JobUpdate,
    ) -> Result<u64, JobStoreError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let (error_message, clear_error) = match update.error_message {
            ErrorUpdate::Keep => (None, false),
            ErrorUpdate::Set(message) => (Some(message), false),
            ErrorUpdate::Clear => (None, true),
        };

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                updated_at = $3,
                error_message = CASE WHEN $7 THEN NULL ELSE COALESCE($4, error_message) END,
                retry_count = COALESCE($5, retry_count)
            WHERE id = $1 AND status = ANY($6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(new_status.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .bind(update.retry_count.map(|c| c as i32))
        .bind(expected)
        .bind(clear_error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("conditional_update_status", e))?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug)]
struct JobRow {
    id: uuid::Uuid,
    name: String,
    job_type: String,
    status: String,
    config: Option<serde_json::Value>,
    error_message: Option<String>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn from_pg(row: &sqlx::postgres::PgRow) -> Result<Self, JobStoreError> {
        let decode = |e: sqlx::Error| JobStoreError::Corrupt(format!("failed to decode job row: {e}"));
        Ok(JobRow {
            id: row.try_get("id").map_err(decode)?,
            name: row.try_get("name").map_err(decode)?,
            job_type: row.try_get("job_type").map_err(decode)?,
            status: row.try_get("status").map_err(decode)?,
            config: row.try_get("config").map_err(decode)?,
            error_message: row.try_get("error_message").map_err(decode)?,
            retry_count: row.try_get("retry_count").map_err(decode)?,
            created_at: row.try_get("created_at").map_err(decode)?,
            updated_at: row.try_get("updated_at").map_err(decode)?,
        })
    }

    fn into_job(self) -> Result<Job, JobStoreError> {
        let job_type: JobType = self
            .job_type
            .parse()
            .map_err(|e| JobStoreError::Corrupt(format!("job {}: {e}", self.id)))?;
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e| JobStoreError::Corrupt(format!("job {}: {e}", self.id)))?;
        let retry_count = u32::try_from(self.retry_count).map_err(|_| {
            JobStoreError::Corrupt(format!(
                "job {}: negative retry_count {}",
                self.id, self.retry_count
            ))
        })?;

        // Only objects are ever written; anything else reads back as absent.
        let config: Option<JobConfig> = match self.config {
            Some(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        };

        Ok(Job {
            id: JobId::from_uuid(self.id),
            name: self.name,
            job_type,
            status,
            config,
            error_message: self.error_message,
            retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
