//! Controller-level error taxonomy.

use crate::model::{JobId, JobStatus};
use crate::service::ServiceError;
use thiserror::Error;

/// Rejected generation parameters. Nothing is sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job spec: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn empty_prompt() -> Self {
        Self("empty prompt".into())
    }
}

/// The service did not accept the submission; no job was created.
#[derive(Debug, Error)]
#[error("submission failed: {source}")]
pub struct SubmissionError {
    #[from]
    pub source: ServiceError,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// A single status check failed. Transient unless the retry policy is exhausted.
#[derive(Debug, Error)]
#[error("status check for job {job_id} failed: {source}")]
pub struct StatusCheckError {
    pub job_id: JobId,
    #[source]
    pub source: ServiceError,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("job {0} is not known to this controller")]
    UnknownJob(JobId),

    #[error("job {job_id} is {status}; its world is only available once completed")]
    NotCompleted { job_id: JobId, status: JobStatus },

    #[error("download of job {job_id} failed: {source}")]
    Service {
        job_id: JobId,
        #[source]
        source: ServiceError,
    },
}

/// Recent jobs could not be fetched; the previous list is kept.
#[derive(Debug, Error)]
#[error("recent jobs refresh failed: {0}")]
pub struct CacheRefreshError(#[from] pub ServiceError);
