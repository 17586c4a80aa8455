//! Errors raised while talking to the generation service.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Error body returned by the service on non-2xx responses.
#[derive(Deserialize)]
struct RawError {
    detail: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure: connection refused, TLS, body decoding, client timeout.
    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    /// The call did not finish within the controller's deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid service URL {0}")]
    InvalidUrl(String),

    /// The task running the request panicked or was cancelled.
    #[error("request task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub async fn from_response(response: reqwest::Response) -> ServiceError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response text".to_string());
        let message = detail_message(&body).unwrap_or(body);

        ServiceError::Http { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Reqwest(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Extract the human-readable `detail` from an error body, if it has one.
fn detail_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<RawError>(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
