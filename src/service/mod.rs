//! Boundary to the remote generation service.

mod client;
mod error;
#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpGenerationClient;
pub use error::ServiceError;

use crate::model::{JobId, JobSpec, JobSummary, StatusResponse, SubmitResponse};
use bytes::Bytes;

/// Request/response contract of the generation service.
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit a new generation job.
    async fn submit(&self, spec: &JobSpec) -> Result<SubmitResponse, ServiceError>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError>;

    /// List up to `limit` recent jobs, most recent first.
    async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobSummary>, ServiceError>;

    /// Download the artifact of a completed job.
    async fn download(&self, job_id: &JobId) -> Result<Bytes, ServiceError>;
}
