//! Text formatting for CLI output.
//!
//! Builds the human-readable lines printed in text mode: progress lines for
//! the active job and the recent jobs listing.

use crate::model::{ControllerEvent, Job, JobStatus, JobSummary};

const BAR_WIDTH: usize = 30;
const PROMPT_WIDTH: usize = 48;

/// Fixed-width bar for a 0..=100 progress value.
pub(crate) fn progress_bar(progress: u32) -> String {
    let progress = progress.min(100) as usize;
    let filled = progress * BAR_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        progress
    )
}

/// One-line status message for a job, as shown while tracking it.
pub(crate) fn job_status_message(job: &Job) -> String {
    match job.status {
        JobStatus::Queued if job.progress == 0 => "Generation queued...".to_string(),
        JobStatus::Completed => "Generation completed! Download available.".to_string(),
        JobStatus::Failed => format!(
            "Generation failed: {}",
            job.error.as_deref().unwrap_or("Unknown error")
        ),
        status => format!("Status: {} ({}%)", status, job.progress),
    }
}

pub(crate) fn job_line(job: &Job) -> String {
    format!("{} {} {}", job.id, progress_bar(job.progress), job_status_message(job))
}

/// Text line for a controller event, or `None` for events not worth printing.
pub(crate) fn event_line(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::Submitted { job } => Some(format!("Submitted job {}", job.id)),
        ControllerEvent::Resumed { job }
        | ControllerEvent::Progress { job }
        | ControllerEvent::Completed { job }
        | ControllerEvent::Failed { job } => Some(job_line(job)),
        ControllerEvent::StatusCheckFailed {
            attempt,
            message,
            retry_in,
            ..
        } => Some(format!(
            "Error checking status (attempt {attempt}): {message}; retrying in {}",
            humantime::format_duration(*retry_in)
        )),
        ControllerEvent::StaleResponseDiscarded { .. }
        | ControllerEvent::RecentJobsUpdated { .. }
        | ControllerEvent::RecentJobsRefreshFailed { .. } => None,
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Lines for the recent jobs listing, most recent first.
pub(crate) fn recent_jobs_lines(jobs: &[JobSummary]) -> Vec<String> {
    if jobs.is_empty() {
        return vec!["No recent generations".to_string()];
    }
    jobs.iter()
        .map(|job| {
            let prompt = if job.prompt.trim().is_empty() {
                "No description".to_string()
            } else {
                truncate(job.prompt.trim(), PROMPT_WIDTH)
            };
            format!(
                "{:<36}  {:<9} {:>3}%  {}",
                job.id.as_str(),
                job.status.as_str(),
                job.progress.min(100),
                prompt
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobId;
    use std::time::Duration;

    fn job(status: JobStatus, progress: u32, error: Option<&str>) -> Job {
        let mut job = Job::queued(JobId::new("J1"), "A medieval castle");
        job.status = status;
        job.progress = progress;
        job.error = error.map(str::to_string);
        job
    }

    #[test]
    fn progress_bar_scales_and_caps() {
        assert_eq!(progress_bar(0), format!("[{}]   0%", "-".repeat(30)));
        assert_eq!(progress_bar(50), format!("[{}{}]  50%", "#".repeat(15), "-".repeat(15)));
        assert_eq!(progress_bar(250), format!("[{}] 100%", "#".repeat(30)));
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            job_status_message(&job(JobStatus::Queued, 0, None)),
            "Generation queued..."
        );
        assert_eq!(
            job_status_message(&job(JobStatus::Running, 40, None)),
            "Status: running (40%)"
        );
        assert_eq!(
            job_status_message(&job(JobStatus::Completed, 100, None)),
            "Generation completed! Download available."
        );
        assert_eq!(
            job_status_message(&job(JobStatus::Failed, 10, Some("out of memory"))),
            "Generation failed: out of memory"
        );
        assert_eq!(
            job_status_message(&job(JobStatus::Failed, 10, None)),
            "Generation failed: Unknown error"
        );
    }

    #[test]
    fn retry_event_mentions_backoff() {
        let line = event_line(&ControllerEvent::StatusCheckFailed {
            job_id: JobId::new("J1"),
            attempt: 2,
            message: "HTTP error with status 503: busy".into(),
            retry_in: Duration::from_secs(4),
        })
        .unwrap();
        assert_eq!(
            line,
            "Error checking status (attempt 2): HTTP error with status 503: busy; retrying in 4s"
        );
        assert!(event_line(&ControllerEvent::StaleResponseDiscarded {
            job_id: JobId::new("J0")
        })
        .is_none());
    }

    #[test]
    fn empty_recent_list() {
        assert_eq!(recent_jobs_lines(&[]), ["No recent generations"]);
    }

    #[test]
    fn recent_list_truncates_long_prompts() {
        let long = "x".repeat(80);
        let jobs = vec![
            JobSummary {
                id: JobId::new("a"),
                prompt: long,
                status: JobStatus::Completed,
                progress: 100,
                created_at: None,
            },
            JobSummary {
                id: JobId::new("b"),
                prompt: String::new(),
                status: JobStatus::Queued,
                progress: 0,
                created_at: None,
            },
        ];
        let lines = recent_jobs_lines(&jobs);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a "));
        assert!(lines[0].contains("completed"));
        assert!(lines[0].ends_with(&format!("{}...", "x".repeat(45))));
        assert!(lines[1].ends_with("No description"));
    }
}
