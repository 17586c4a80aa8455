use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const MIN_WORLD_SIZE: u32 = 128;
pub const MAX_WORLD_SIZE: u32 = 2048;
pub const WORLD_SIZE_STEP: u32 = 64;
pub const DEFAULT_WORLD_SIZE: u32 = 512;

/// Opaque job identifier assigned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Validated generation parameters, serialized as the submit request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub prompt: String,
    pub world_size: u32,
    pub complexity: Complexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub include_terrain: bool,
    pub include_structures: bool,
    pub include_objects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    // The service reports in-progress work as "processing".
    #[serde(alias = "processing")]
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local view of a submitted generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub prompt: String,
    pub status: JobStatus,
    pub progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: String,
}

impl Job {
    /// A freshly submitted job: queued with no progress.
    pub fn queued(id: JobId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            status: JobStatus::Queued,
            progress: 0,
            error: None,
            submitted_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
        }
    }
}

/// One entry of the service's recent jobs listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "job_id")]
    pub id: JobId,
    #[serde(default)]
    pub prompt: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentJobsResponse {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

/// Runtime settings for the controller and its HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub api_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,
    pub recent_limit: usize,
    /// Consecutive failed status checks before the job is marked failed. 0 disables the limit.
    pub max_poll_failures: u32,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Fractional jitter applied to backoff delays (0.1 = ±10%).
    pub backoff_jitter: f64,
    pub artifact_extension: String,
    pub user_agent: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            poll_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            recent_limit: 5,
            max_poll_failures: 10,
            max_backoff: Duration::from_secs(30),
            backoff_jitter: 0.1,
            artifact_extension: "rbxlx".into(),
            user_agent: format!("worldgen/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Events emitted by the controller for presentation layers.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Submitted {
        job: Job,
    },
    Resumed {
        job: Job,
    },
    Progress {
        job: Job,
    },
    Completed {
        job: Job,
    },
    Failed {
        job: Job,
    },
    /// A single status check failed; polling continues after `retry_in`.
    StatusCheckFailed {
        job_id: JobId,
        attempt: u32,
        message: String,
        retry_in: Duration,
    },
    StaleResponseDiscarded {
        job_id: JobId,
    },
    RecentJobsUpdated {
        jobs: Vec<JobSummary>,
    },
    RecentJobsRefreshFailed {
        message: String,
    },
}
