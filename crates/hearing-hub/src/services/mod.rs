//! Downstream REST collaborators.
//!
//! Each client sits behind an `async_trait` so the cache and hub can be
//! exercised against the mock implementations in tests.

pub mod user_api;
pub mod video_api;

pub use user_api::{HttpUserApiClient, MockUserApiClient, UserApiClient};
pub use video_api::{HttpVideoApiClient, MockVideoApiClient, VideoApiClient};

use thiserror::Error;

/// Failure talking to a downstream API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    /// The requested resource does not exist downstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure, timeout or 5xx.
    #[error("Downstream unavailable: {0}")]
    Unavailable(String),

    /// The response could not be understood.
    #[error("Invalid downstream response: {0}")]
    InvalidResponse(String),
}

/// Map a non-success status to a `DownstreamError`.
pub(crate) fn classify_status(status: reqwest::StatusCode, what: &str) -> DownstreamError {
    if status == reqwest::StatusCode::NOT_FOUND {
        DownstreamError::NotFound(what.to_string())
    } else if status.is_server_error() {
        DownstreamError::Unavailable(format!("{what}: HTTP {status}"))
    } else {
        DownstreamError::InvalidResponse(format!("{what}: HTTP {status}"))
    }
}
