//! Hearing Hub error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.

use crate::services::DownstreamError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::types::ConferenceId;
use serde::Serialize;
use thiserror::Error;

/// Hearing Hub error type.
///
/// Maps to HTTP status codes:
/// - ConferenceNotFound, NotFound: 404
/// - BadRequest: 400
/// - Unauthorized: 401
/// - Forbidden: 403
/// - Downstream: 502
/// - ConferenceBusy: 503
/// - Internal: 500
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Conference {0} not found")]
    ConferenceNotFound(ConferenceId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Downstream failure: {0}")]
    Downstream(DownstreamError),

    #[error("Conference {0} is busy")]
    ConferenceBusy(ConferenceId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            HubError::ConferenceNotFound(_) | HubError::NotFound(_) => 404,
            HubError::BadRequest(_) => 400,
            HubError::Unauthorized(_) => 401,
            HubError::Forbidden(_) => 403,
            HubError::Downstream(_) => 502,
            HubError::ConferenceBusy(_) => 503,
            HubError::Internal(_) => 500,
        }
    }
}

impl From<DownstreamError> for HubError {
    fn from(err: DownstreamError) -> Self {
        match err {
            DownstreamError::NotFound(what) => HubError::NotFound(what),
            other => HubError::Downstream(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            HubError::ConferenceNotFound(id) => (
                StatusCode::NOT_FOUND,
                "CONFERENCE_NOT_FOUND",
                format!("Conference {id} not found"),
            ),
            HubError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            HubError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            HubError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.clone())
            }
            HubError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            HubError::Downstream(err) => {
                // Log actual error server-side, return generic message to client
                tracing::warn!(target: "hh.downstream", error = %err, "Downstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "DOWNSTREAM_UNAVAILABLE",
                    "A downstream service is unavailable".to_string(),
                )
            }
            HubError::ConferenceBusy(id) => {
                tracing::warn!(target: "hh.cache", conference_id = %id, "Conference lock timed out");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CONFERENCE_BUSY",
                    "Conference is busy. Please retry.".to_string(),
                )
            }
            HubError::Internal(reason) => {
                tracing::error!(target: "hh.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
