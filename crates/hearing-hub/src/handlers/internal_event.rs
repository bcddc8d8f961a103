//! Internal event handler endpoint.

use crate::errors::HubError;
use crate::internal_events::{InternalEvent, InternalEventKind};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalEventOutcome {
    Handled,
    /// No handler registered for the kind.
    Ignored,
}

#[derive(Debug, Serialize)]
pub struct InternalEventResponse {
    pub outcome: InternalEventOutcome,
}

/// Handler for POST /internal-event/:kind
///
/// Unknown kinds are 404. A known kind without a registered handler is a
/// no-op and answers `ignored`.
#[instrument(skip_all, name = "hh.handlers.internal_event", fields(kind = %kind))]
pub async fn handle_internal_event(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<InternalEventResponse>, HubError> {
    let kind: InternalEventKind = kind.parse()?;

    let body: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        debug!(target: "hh.handlers.internal_event", error = %e, "Invalid internal event body");
        HubError::BadRequest("Invalid request body".to_string())
    })?;
    let event = InternalEvent::from_parts(kind, body)?;

    let Some(handler) = state.registry.get(&event) else {
        debug!(target: "hh.handlers.internal_event", kind = %kind, "No handler registered");
        metrics::record_internal_event(kind.as_str(), "unhandled");
        return Ok(Json(InternalEventResponse {
            outcome: InternalEventOutcome::Ignored,
        }));
    };

    match handler.handle(&event).await {
        Ok(()) => {
            metrics::record_internal_event(kind.as_str(), "handled");
            Ok(Json(InternalEventResponse {
                outcome: InternalEventOutcome::Handled,
            }))
        }
        Err(e) => {
            metrics::record_internal_event(kind.as_str(), "error");
            Err(e)
        }
    }
}
