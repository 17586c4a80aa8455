//! Job lifecycle orchestration.
//!
//! This module owns the active job: submission, status polling and
//! reconciliation, the recent jobs cache and artifact retrieval. CLI layers
//! call into it through [`Controller`] or the [`run_controller`] command loop.

mod artifact;
mod controller;
mod recent;
mod reconcile;
mod scheduler;

pub use artifact::{artifact_filename, default_output_dir, save, Artifact};
pub use controller::{run_controller, Command, Controller};
pub use recent::RecentJobs;
pub use reconcile::{fail, reconcile, Reconciled, Transition, UNKNOWN_ERROR};
pub use scheduler::RetryPolicy;

use crate::service::ServiceError;
use std::future::Future;
use std::time::Duration;

/// Bound a service call by `timeout`. An elapsed deadline is reported as
/// [`ServiceError::Timeout`] and drops the request.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(ServiceError::Timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_maps_elapsed_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServiceError>(1)
        };
        let err = with_timeout(Duration::from_secs(1), slow).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "request timed out after 1s");
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_passes_results_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok::<_, ServiceError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = with_timeout(Duration::from_secs(1), async {
            Err::<u8, _>(ServiceError::Http {
                status: 404,
                message: "Job not found".into(),
            })
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
