//! Job lifecycle controller.
//!
//! Owns the active job, its poll schedule and the recent jobs cache, and emits
//! events for presentation layers.

use super::artifact::{artifact_filename, Artifact};
use super::recent::{RecentJobs, RefreshFuture};
use super::reconcile::{self, Reconciled, Transition};
use super::scheduler::{FailureVerdict, PollReply, PollScheduler, RetryPolicy, Wake};
use super::with_timeout;
use crate::builder::{build_spec, JobRequest};
use crate::error::{RetrievalError, StatusCheckError, SubmissionError, SubmitError};
use crate::model::{
    ControllerConfig, ControllerEvent, Job, JobId, JobStatus, JobSummary, StatusResponse,
};
use crate::service::GenerationService;
use futures::future::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

/// Commands sent by presentation layers to a running controller.
#[derive(Debug)]
pub enum Command {
    Submit {
        request: JobRequest,
        reply: oneshot::Sender<Result<JobId, SubmitError>>,
    },
    Resume {
        job_id: JobId,
        reply: oneshot::Sender<Result<Job, StatusCheckError>>,
    },
    Download {
        job_id: JobId,
        reply: oneshot::Sender<Result<Artifact, RetrievalError>>,
    },
    RefreshRecent,
    Quit,
}

pub struct Controller {
    service: Arc<dyn GenerationService>,
    cfg: ControllerConfig,
    event_tx: Option<UnboundedSender<ControllerEvent>>,
    active: Option<Job>,
    scheduler: PollScheduler,
    recent: RecentJobs,
    pending_refresh: Option<RefreshFuture>,
    refresh_again: bool,
}

async fn next_refresh(
    slot: &mut Option<RefreshFuture>,
) -> Result<Vec<JobSummary>, crate::service::ServiceError> {
    match slot {
        Some(fut) => fut.await,
        None => futures::future::pending().await,
    }
}

impl Controller {
    pub fn new(
        service: Arc<dyn GenerationService>,
        cfg: ControllerConfig,
        event_tx: Option<UnboundedSender<ControllerEvent>>,
    ) -> Self {
        let policy = RetryPolicy {
            max_failures: cfg.max_poll_failures,
            max_backoff: cfg.max_backoff,
            jitter: cfg.backoff_jitter,
        };
        Self {
            scheduler: PollScheduler::new(cfg.poll_interval, policy),
            recent: RecentJobs::new(cfg.recent_limit),
            service,
            cfg,
            event_tx,
            active: None,
            pending_refresh: None,
            refresh_again: false,
        }
    }

    /// Initial refresh of the recent jobs list.
    pub async fn init(&mut self) {
        self.refresh_recent().await;
    }

    /// The job currently tracked, including a terminal one until it is replaced.
    pub fn job(&self) -> Option<&Job> {
        self.active.as_ref()
    }

    pub fn recent_jobs(&self) -> &[JobSummary] {
        self.recent.jobs()
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Whether [`Controller::step`] has anything to wait for.
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.is_running()
            || self.scheduler.has_outstanding()
            || self.pending_refresh.is_some()
    }

    /// Last known status of a job, from the active job or the recent jobs list.
    pub fn job_status(&self, job_id: &JobId) -> Option<JobStatus> {
        if let Some(job) = self.active.as_ref().filter(|j| &j.id == job_id) {
            return Some(job.status);
        }
        self.recent.find(job_id).map(|j| j.status)
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Validate and submit a request, making the new job the active one.
    ///
    /// A previously active job keeps running on the service; it is only no
    /// longer polled.
    pub async fn submit(&mut self, request: &JobRequest) -> Result<JobId, SubmitError> {
        let spec = build_spec(request)?;
        let response = with_timeout(self.cfg.request_timeout, self.service.submit(&spec))
            .await
            .map_err(SubmissionError::from)?;

        if response.status != JobStatus::Queued {
            tracing::debug!(
                job_id = %response.job_id,
                status = %response.status,
                "service reported a non-queued initial status"
            );
        }
        if let Some(prev) = self.active.as_ref().filter(|j| !j.status.is_terminal()) {
            tracing::info!(job_id = %prev.id, "no longer tracking job; it keeps running on the service");
        }

        let job = Job::queued(response.job_id.clone(), spec.prompt);
        tracing::info!(job_id = %job.id, "job submitted");
        self.activate(job.clone());
        self.emit(ControllerEvent::Submitted { job });
        Ok(response.job_id)
    }

    /// Start tracking a job submitted earlier, e.g. by a previous session.
    ///
    /// Performs one status check; a non-terminal job is then polled like a
    /// fresh submission.
    pub async fn resume(&mut self, job_id: JobId) -> Result<Job, StatusCheckError> {
        let response = with_timeout(self.cfg.request_timeout, self.service.status(&job_id))
            .await
            .map_err(|source| StatusCheckError {
                job_id: job_id.clone(),
                source,
            })?;

        let prompt = self
            .recent
            .find(&job_id)
            .map(|s| s.prompt.clone())
            .unwrap_or_default();
        let job = reconcile::reconcile(&Job::queued(job_id, prompt), &response).job;
        tracing::info!(job_id = %job.id, status = %job.status, "resumed job");

        if job.status.is_terminal() {
            self.scheduler.stop();
            self.active = Some(job.clone());
        } else {
            self.activate(job.clone());
        }
        self.emit(ControllerEvent::Resumed { job: job.clone() });
        Ok(job)
    }

    fn activate(&mut self, job: Job) {
        self.scheduler.start(job.id.clone());
        self.active = Some(job);
    }

    /// Wait for the next scheduled event and apply it: a poll tick, a status
    /// reply, or a finished recent jobs refresh. Cancel-safe.
    pub async fn step(&mut self) {
        tokio::select! {
            wake = self.scheduler.next() => match wake {
                Wake::Tick(job_id) => self.issue_poll(job_id),
                Wake::Reply(reply) => self.handle_poll_reply(reply),
            },
            result = next_refresh(&mut self.pending_refresh) => {
                self.pending_refresh = None;
                self.apply_refresh(result);
                if std::mem::take(&mut self.refresh_again) {
                    self.schedule_refresh();
                }
            }
        }
    }

    fn issue_poll(&mut self, job_id: JobId) {
        tracing::debug!(job_id = %job_id, "checking status");
        let service = Arc::clone(&self.service);
        let timeout = self.cfg.request_timeout;
        let id = job_id.clone();
        let request = async move { with_timeout(timeout, service.status(&id)).await }.boxed();
        self.scheduler.issue(job_id, request);
    }

    fn handle_poll_reply(&mut self, reply: PollReply) {
        let PollReply { job_id, result } = reply;

        let current = match self.active.as_ref() {
            Some(job) if job.id == job_id && self.scheduler.target() == Some(&job_id) => {
                job.clone()
            }
            _ => {
                tracing::debug!(job_id = %job_id, "discarding status for a job no longer tracked");
                self.emit(ControllerEvent::StaleResponseDiscarded { job_id });
                return;
            }
        };

        match result {
            Ok(response) => {
                self.scheduler.record_success();
                self.apply_status(&current, &response);
            }
            Err(source) => {
                let err = StatusCheckError { job_id, source };
                match self.scheduler.record_failure() {
                    FailureVerdict::Retry { attempt, after } => {
                        tracing::warn!(attempt, retry_in = ?after, "{err}");
                        self.emit(ControllerEvent::StatusCheckFailed {
                            job_id: err.job_id.clone(),
                            attempt,
                            message: err.source.to_string(),
                            retry_in: after,
                        });
                    }
                    FailureVerdict::Exhausted { attempts } => {
                        tracing::error!(attempts, "{err}; giving up");
                        let message =
                            format!("status check failed {attempts} times in a row: {}", err.source);
                        let outcome = reconcile::fail(&current, message);
                        self.apply_outcome(outcome);
                    }
                }
            }
        }
    }

    fn apply_status(&mut self, current: &Job, response: &StatusResponse) {
        let outcome = reconcile::reconcile(current, response);
        self.apply_outcome(outcome);
    }

    fn apply_outcome(&mut self, outcome: Reconciled) {
        let Reconciled { job, transition } = outcome;
        match transition {
            Transition::Unchanged => {}
            Transition::Progressed => {
                tracing::debug!(job_id = %job.id, status = %job.status, progress = job.progress, "job progressed");
                self.active = Some(job.clone());
                self.emit(ControllerEvent::Progress { job });
            }
            Transition::Completed => {
                tracing::info!(job_id = %job.id, "job completed");
                self.scheduler.stop();
                self.active = Some(job.clone());
                self.emit(ControllerEvent::Completed { job });
                self.schedule_refresh();
            }
            Transition::Failed => {
                tracing::warn!(
                    job_id = %job.id,
                    error = job.error.as_deref().unwrap_or(reconcile::UNKNOWN_ERROR),
                    "job failed"
                );
                self.scheduler.stop();
                self.active = Some(job.clone());
                self.emit(ControllerEvent::Failed { job });
            }
        }
    }

    /// Refresh the recent jobs list now. Failures keep the previous list and
    /// are reported as events, never returned.
    pub async fn refresh_recent(&mut self) {
        let result = RecentJobs::fetch(
            Arc::clone(&self.service),
            self.recent.limit(),
            self.cfg.request_timeout,
        )
        .await;
        self.apply_refresh(result);
    }

    fn schedule_refresh(&mut self) {
        if self.pending_refresh.is_some() {
            self.refresh_again = true;
            return;
        }
        self.pending_refresh = Some(RecentJobs::fetch(
            Arc::clone(&self.service),
            self.recent.limit(),
            self.cfg.request_timeout,
        ));
    }

    fn apply_refresh(
        &mut self,
        result: Result<Vec<JobSummary>, crate::service::ServiceError>,
    ) {
        match self.recent.apply(result) {
            Ok(jobs) => {
                let jobs = jobs.to_vec();
                tracing::debug!(count = jobs.len(), "recent jobs refreshed");
                self.emit(ControllerEvent::RecentJobsUpdated { jobs });
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.emit(ControllerEvent::RecentJobsRefreshFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Fetch the artifact of a job known to be completed.
    pub async fn download(&mut self, job_id: &JobId) -> Result<Artifact, RetrievalError> {
        let status = self
            .job_status(job_id)
            .ok_or_else(|| RetrievalError::UnknownJob(job_id.clone()))?;
        if status != JobStatus::Completed {
            return Err(RetrievalError::NotCompleted {
                job_id: job_id.clone(),
                status,
            });
        }

        let bytes = with_timeout(self.cfg.download_timeout, self.service.download(job_id))
            .await
            .map_err(|source| RetrievalError::Service {
                job_id: job_id.clone(),
                source,
            })?;
        tracing::info!(job_id = %job_id, bytes = bytes.len(), "artifact downloaded");

        Ok(Artifact {
            job_id: job_id.clone(),
            filename: artifact_filename(job_id, &self.cfg.artifact_extension),
            bytes,
        })
    }

    /// Stop polling and drop every outstanding request.
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
        self.scheduler.abandon_outstanding();
        self.pending_refresh = None;
        self.refresh_again = false;
    }
}

/// Drive a controller from commands until `Quit` or the command channel closes.
/// The recent jobs list is refreshed before the first command is handled.
pub async fn run_controller(mut controller: Controller, mut cmd_rx: UnboundedReceiver<Command>) {
    controller.init().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Submit { request, reply }) => {
                        let _ = reply.send(controller.submit(&request).await);
                    }
                    Some(Command::Resume { job_id, reply }) => {
                        let _ = reply.send(controller.resume(job_id).await);
                    }
                    Some(Command::Download { job_id, reply }) => {
                        let _ = reply.send(controller.download(&job_id).await);
                    }
                    Some(Command::RefreshRecent) => controller.refresh_recent().await,
                    Some(Command::Quit) | None => {
                        controller.shutdown();
                        break;
                    }
                }
            }
            _ = controller.step(), if controller.has_pending_work() => {}
        }
    }
}
