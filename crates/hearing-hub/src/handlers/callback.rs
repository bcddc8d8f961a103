//! Video platform callback handler.

use crate::errors::HubError;
use crate::events::{CallbackEventRequest, CallbackOutcome, EventType};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub outcome: CallbackOutcome,
}

/// Handler for POST /callback
///
/// Always 200 with the outcome once the event was understood. Unknown
/// event types are `ignored`; out-of-order events are `dropped`.
#[instrument(skip_all, name = "hh.handlers.callback")]
pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<CallbackResponse>, HubError> {
    let start = Instant::now();

    // Deserialize manually to return 400 rather than Axum's 422
    let request: CallbackEventRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(target: "hh.handlers.callback", error = %e, "Invalid callback body");
        metrics::record_callback_event("unknown", "error", start.elapsed());
        HubError::BadRequest("Invalid request body".to_string())
    })?;

    let event_type = EventType::from_name(&request.event_type).map_or("unknown", EventType::as_str);

    match state.processor.process(&request).await {
        Ok(outcome) => {
            metrics::record_callback_event(event_type, outcome.as_str(), start.elapsed());
            Ok(Json(CallbackResponse { outcome }))
        }
        Err(e) => {
            metrics::record_callback_event(event_type, "error", start.elapsed());
            Err(e)
        }
    }
}
