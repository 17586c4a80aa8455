//! Scripted in-memory generation service for tests.

use super::{GenerationService, ServiceError};
use crate::model::{JobId, JobSpec, JobStatus, JobSummary, StatusResponse, SubmitResponse};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply. The last reply of a queue is repeated once the rest are consumed.
#[derive(Debug, Clone)]
pub(crate) enum Scripted<T> {
    Ok(T),
    Delayed(Duration, T),
    Fail(u16, String),
    Hang,
}

impl<T: Clone> Scripted<T> {
    async fn resolve(self) -> Result<T, ServiceError> {
        match self {
            Scripted::Ok(v) => Ok(v),
            Scripted::Delayed(d, v) => {
                tokio::time::sleep(d).await;
                Ok(v)
            }
            Scripted::Fail(status, message) => Err(ServiceError::Http { status, message }),
            Scripted::Hang => futures::future::pending().await,
        }
    }
}

fn next_reply<T: Clone>(queue: &mut VecDeque<Scripted<T>>) -> Option<Scripted<T>> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Default)]
struct Script {
    submit: VecDeque<Scripted<SubmitResponse>>,
    status: HashMap<JobId, VecDeque<Scripted<StatusResponse>>>,
    recent: VecDeque<Scripted<Vec<JobSummary>>>,
    downloads: HashMap<JobId, Bytes>,
}

#[derive(Default)]
pub(crate) struct FakeService {
    script: Mutex<Script>,
    submitted: Mutex<Vec<JobSpec>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub recent_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    in_flight: Arc<Mutex<HashMap<JobId, usize>>>,
    max_in_flight: Arc<Mutex<HashMap<JobId, usize>>>,
}

/// Keeps the per-job in-flight count accurate even if the request future is dropped.
struct InFlightGuard {
    job_id: JobId,
    in_flight: Arc<Mutex<HashMap<JobId, usize>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(n) = in_flight.get_mut(&self.job_id) {
            *n -= 1;
        }
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, job_id: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .submit
            .push_back(Scripted::Ok(SubmitResponse {
                job_id: JobId::new(job_id),
                status: JobStatus::Queued,
                message: "World generation started".into(),
            }));
        self
    }

    pub fn reject_submit(&self, status: u16, message: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .submit
            .push_back(Scripted::Fail(status, message.into()));
        self
    }

    pub fn status(&self, job_id: &str, reply: Scripted<StatusResponse>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .status
            .entry(JobId::new(job_id))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn recent(&self, reply: Scripted<Vec<JobSummary>>) -> &Self {
        self.script.lock().unwrap().recent.push_back(reply);
        self
    }

    pub fn artifact(&self, job_id: &str, bytes: &'static [u8]) -> &Self {
        self.script
            .lock()
            .unwrap()
            .downloads
            .insert(JobId::new(job_id), Bytes::from_static(bytes));
        self
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self, job_id: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(&JobId::new(job_id))
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, job_id: &JobId) -> InFlightGuard {
        let mut in_flight = self.in_flight.lock().unwrap();
        let n = in_flight.entry(job_id.clone()).or_insert(0);
        *n += 1;
        let mut max = self.max_in_flight.lock().unwrap();
        let m = max.entry(job_id.clone()).or_insert(0);
        *m = (*m).max(*n);
        InFlightGuard {
            job_id: job_id.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

pub(crate) fn status(status: JobStatus, progress: Option<u32>) -> StatusResponse {
    StatusResponse {
        job_id: None,
        status,
        progress,
        error: None,
    }
}

pub(crate) fn failed(error: Option<&str>) -> StatusResponse {
    StatusResponse {
        job_id: None,
        status: JobStatus::Failed,
        progress: None,
        error: error.map(str::to_string),
    }
}

pub(crate) fn summary(id: &str, prompt: &str, status: JobStatus, progress: u32) -> JobSummary {
    JobSummary {
        id: JobId::new(id),
        prompt: prompt.into(),
        status,
        progress,
        created_at: None,
    }
}

#[async_trait::async_trait]
impl GenerationService for FakeService {
    async fn submit(&self, spec: &JobSpec) -> Result<SubmitResponse, ServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(spec.clone());
        let reply = self.script.lock().unwrap().submit.pop_front();
        match reply {
            Some(r) => r.resolve().await,
            None => Err(ServiceError::Http {
                status: 500,
                message: "no scripted submission".into(),
            }),
        }
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter(job_id);
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.status.get_mut(job_id).and_then(next_reply)
        };
        match reply {
            Some(r) => r.resolve().await,
            None => Err(ServiceError::Http {
                status: 404,
                message: "Job not found".into(),
            }),
        }
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobSummary>, ServiceError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        let reply = next_reply(&mut self.script.lock().unwrap().recent);
        match reply {
            Some(r) => r.resolve().await.map(|mut jobs| {
                jobs.truncate(limit);
                jobs
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn download(&self, job_id: &JobId) -> Result<Bytes, ServiceError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.script.lock().unwrap().downloads.get(job_id).cloned();
        bytes.ok_or_else(|| ServiceError::Http {
            status: 404,
            message: "World file not found".into(),
        })
    }
}
