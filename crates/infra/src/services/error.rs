use jobflow_core::{JobId, JobStatus, ValidationError};

use crate::jobs::JobStoreError;

/// Error returned by the ingestion and control services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad caller input.
    #[error("validation failed on {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The operation is not legal for the job's current status.
    #[error("job {id} cannot be modified in status {status}")]
    InvalidJobState { id: JobId, status: JobStatus },

    #[error("job {id} has reached the maximum of {retry_count} retries")]
    MaxRetriesReached { id: JobId, retry_count: u32 },

    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),
}

/// How a caller should treat a [`ServiceError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input is wrong; do not retry as-is.
    Client,
    NotFound,
    /// Valid request, but it conflicts with the job's current state.
    Conflict,
    /// Store or transport failure.
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation { .. } => ErrorKind::Client,
            ServiceError::JobNotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidJobState { .. } | ServiceError::MaxRetriesReached { .. } => {
                ErrorKind::Conflict
            }
            ServiceError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        ServiceError::Validation {
            field: value.field,
            message: value.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_error_taxonomy() {
        let id = JobId::new();
        assert_eq!(
            ServiceError::from(ValidationError::new("name", "job name is required")).kind(),
            ErrorKind::Client
        );
        assert_eq!(ServiceError::JobNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            ServiceError::InvalidJobState {
                id,
                status: JobStatus::Completed
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::MaxRetriesReached { id, retry_count: 3 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::Store(JobStoreError::Storage("down".into())).kind(),
            ErrorKind::Internal
        );
    }
}
