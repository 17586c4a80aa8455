//! Status reconciliation: folds a status response into the local job view.

use crate::model::{Job, JobStatus, StatusResponse};

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// What a reconciliation did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Progressed,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub job: Job,
    pub transition: Transition,
}

impl Reconciled {
    fn unchanged(job: &Job) -> Self {
        Self {
            job: job.clone(),
            transition: Transition::Unchanged,
        }
    }
}

/// Apply a status response to a job.
///
/// Terminal jobs are never modified. Progress never decreases and a running job
/// never falls back to queued. A completed job always reports 100%.
pub fn reconcile(job: &Job, response: &StatusResponse) -> Reconciled {
    if job.status.is_terminal() {
        return Reconciled::unchanged(job);
    }

    let reported = response.progress.unwrap_or(0).min(100);
    let mut next = job.clone();

    let transition = match response.status {
        JobStatus::Completed => {
            next.status = JobStatus::Completed;
            next.progress = 100;
            next.error = None;
            Transition::Completed
        }
        JobStatus::Failed => {
            next.status = JobStatus::Failed;
            next.progress = job.progress.max(reported);
            next.error = Some(
                response
                    .error
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(UNKNOWN_ERROR)
                    .to_string(),
            );
            Transition::Failed
        }
        JobStatus::Queued | JobStatus::Running => {
            if job.status != JobStatus::Running {
                next.status = response.status;
            }
            next.progress = job.progress.max(reported);
            if next.status == job.status && next.progress == job.progress {
                Transition::Unchanged
            } else {
                Transition::Progressed
            }
        }
    };

    Reconciled {
        job: next,
        transition,
    }
}

/// Mark a job failed locally, e.g. when its status could not be checked for too long.
pub fn fail(job: &Job, message: impl Into<String>) -> Reconciled {
    if job.status.is_terminal() {
        return Reconciled::unchanged(job);
    }
    let mut next = job.clone();
    next.status = JobStatus::Failed;
    next.error = Some(message.into());
    Reconciled {
        job: next,
        transition: Transition::Failed,
    }
}
