//! Downloaded world artifacts and saving them to disk.

use crate::model::JobId;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Opaque artifact payload of a completed job.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub job_id: JobId,
    pub filename: String,
    pub bytes: Bytes,
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Suggested filename for a job's artifact: `world_<jobId>.<ext>`.
///
/// Both the id and the extension may come from outside, so anything outside
/// `[A-Za-z0-9_-]` is replaced to keep the name inside the target directory.
pub fn artifact_filename(job_id: &JobId, extension: &str) -> String {
    let id = sanitize(job_id.as_str());
    let extension = sanitize(extension.trim_start_matches('.'));
    if extension.is_empty() {
        format!("world_{id}")
    } else {
        format!("world_{id}.{extension}")
    }
}

/// Where artifacts go when no directory is configured.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write an artifact into `dir`, creating it if needed. Returns the written path.
pub fn save(artifact: &Artifact, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(&artifact.filename);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
