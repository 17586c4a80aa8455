//! Bounded, most-recent-first cache of job summaries.

use crate::error::CacheRefreshError;
use crate::model::{JobId, JobSummary};
use crate::service::{GenerationService, ServiceError};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;

pub(crate) type RefreshFuture = BoxFuture<'static, Result<Vec<JobSummary>, ServiceError>>;

#[derive(Debug, Clone)]
pub struct RecentJobs {
    limit: usize,
    jobs: Vec<JobSummary>,
}

impl RecentJobs {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            jobs: Vec::new(),
        }
    }

    pub fn jobs(&self) -> &[JobSummary] {
        &self.jobs
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn find(&self, job_id: &JobId) -> Option<&JobSummary> {
        self.jobs.iter().find(|j| &j.id == job_id)
    }

    /// Read-through fetch of the service's recent jobs listing.
    pub(crate) fn fetch(
        service: Arc<dyn GenerationService>,
        limit: usize,
        timeout: Duration,
    ) -> RefreshFuture {
        async move { super::with_timeout(timeout, service.recent_jobs(limit)).await }.boxed()
    }

    /// Replace the cached list with a fetch result. A failed fetch leaves the
    /// previous list in place.
    pub fn apply(
        &mut self,
        result: Result<Vec<JobSummary>, ServiceError>,
    ) -> Result<&[JobSummary], CacheRefreshError> {
        let mut jobs = result?;
        jobs.truncate(self.limit);
        self.jobs = jobs;
        Ok(&self.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use crate::service::fake::summary;

    #[test]
    fn refresh_replaces_and_bounds_the_list() {
        let mut recent = RecentJobs::new(2);
        recent
            .apply(Ok(vec![summary("a", "first", JobStatus::Queued, 0)]))
            .unwrap();
        assert_eq!(recent.jobs().len(), 1);

        let listed = recent
            .apply(Ok(vec![
                summary("c", "third", JobStatus::Running, 50),
                summary("b", "second", JobStatus::Completed, 100),
                summary("a", "first", JobStatus::Completed, 100),
            ]))
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(recent.jobs()[0].id.as_str(), "c");
        assert_eq!(recent.jobs()[1].id.as_str(), "b");
        assert!(recent.find(&JobId::new("a")).is_none());
    }

    #[test]
    fn failed_refresh_keeps_stale_list() {
        let mut recent = RecentJobs::new(5);
        recent
            .apply(Ok(vec![summary("a", "first", JobStatus::Completed, 100)]))
            .unwrap();

        let err = recent
            .apply(Err(ServiceError::Http {
                status: 502,
                message: "Bad Gateway".into(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("Bad Gateway"));
        assert_eq!(recent.jobs().len(), 1);
        assert_eq!(
            recent.find(&JobId::new("a")).map(|j| j.status),
            Some(JobStatus::Completed)
        );
    }
}
