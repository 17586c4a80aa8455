//! Poll scheduling.
//!
//! A cancellable interval drives status checks for the active job. Each check
//! runs as its own task from the moment it is issued and is tagged with the job
//! it targets. A tick is skipped while a check for the current target is still
//! in flight. Checks for a job that was replaced keep running to completion and
//! come back tagged, so the controller can discard them.

use crate::model::{JobId, StatusResponse};
use crate::service::ServiceError;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub(crate) type StatusFuture = BoxFuture<'static, Result<StatusResponse, ServiceError>>;

/// Shortest allowed poll period; a zero period would spin.
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(10);

/// A finished status check, tagged with the job it was issued for.
pub(crate) struct PollReply {
    pub job_id: JobId,
    pub result: Result<StatusResponse, ServiceError>,
}

pub(crate) enum Wake {
    /// The target job is due for a status check.
    Tick(JobId),
    Reply(PollReply),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureVerdict {
    Retry { attempt: u32, after: Duration },
    Exhausted { attempts: u32 },
}

/// Backoff for consecutive failed status checks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 0 retries forever.
    pub max_failures: u32,
    pub max_backoff: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    /// Delay before the next check after `attempt` consecutive failures:
    /// the poll period doubled per failure, capped, with random jitter.
    pub fn backoff(&self, period: Duration, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = period
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff.max(period));
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        base.mul_f64(factor.max(0.0))
    }
}

pub(crate) struct PollScheduler {
    period: Duration,
    policy: RetryPolicy,
    ticker: Option<Interval>,
    target: Option<JobId>,
    outstanding: FuturesUnordered<BoxFuture<'static, PollReply>>,
    in_flight: HashMap<JobId, AbortHandle>,
    consecutive_failures: u32,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

impl PollScheduler {
    pub fn new(period: Duration, policy: RetryPolicy) -> Self {
        if period < MIN_POLL_PERIOD {
            tracing::warn!(?period, min = ?MIN_POLL_PERIOD, "poll period too short, using the minimum");
        }
        Self {
            period: period.max(MIN_POLL_PERIOD),
            policy,
            ticker: None,
            target: None,
            outstanding: FuturesUnordered::new(),
            in_flight: HashMap::new(),
            consecutive_failures: 0,
        }
    }

    /// Start ticking for `job_id`, replacing any previous target.
    /// The first check happens one period from now.
    pub fn start(&mut self, job_id: JobId) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.target = Some(job_id);
        self.consecutive_failures = 0;
    }

    /// Cancel future ticks. Requests already in flight are left to finish.
    pub fn stop(&mut self) {
        self.ticker = None;
        self.target = None;
        self.consecutive_failures = 0;
    }

    /// Abort every outstanding request.
    pub fn abandon_outstanding(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        self.outstanding = FuturesUnordered::new();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn target(&self) -> Option<&JobId> {
        self.target.as_ref()
    }

    pub fn has_outstanding(&self) -> bool {
        !self.outstanding.is_empty()
    }

    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.in_flight.contains_key(job_id)
    }

    /// Start a status check for `job_id` now. Its reply comes back from [`Self::next`].
    pub fn issue(&mut self, job_id: JobId, request: StatusFuture) {
        let handle = tokio::spawn(request);
        self.in_flight.insert(job_id.clone(), handle.abort_handle());
        self.outstanding.push(
            async move {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(ServiceError::Task(e.to_string())),
                };
                PollReply { job_id, result }
            }
            .boxed(),
        );
    }

    /// Wait for the next due tick or finished request. Cancel-safe.
    pub async fn next(&mut self) -> Wake {
        loop {
            tokio::select! {
                _ = next_tick(&mut self.ticker) => {
                    if let Some(job_id) = self.due_target() {
                        return Wake::Tick(job_id);
                    }
                }
                Some(reply) = self.outstanding.next(), if !self.outstanding.is_empty() => {
                    self.in_flight.remove(&reply.job_id);
                    return Wake::Reply(reply);
                }
            }
        }
    }

    fn due_target(&self) -> Option<JobId> {
        let target = self.target.as_ref()?;
        if self.is_in_flight(target) {
            tracing::debug!(job_id = %target, "status check still in flight, skipping tick");
            return None;
        }
        Some(target.clone())
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> FailureVerdict {
        self.consecutive_failures += 1;
        let attempt = self.consecutive_failures;
        if self.policy.max_failures > 0 && attempt >= self.policy.max_failures {
            return FailureVerdict::Exhausted { attempts: attempt };
        }
        let after = self.policy.backoff(self.period, attempt);
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.reset_after(after);
        }
        FailureVerdict::Retry { attempt, after }
    }
}
