//! `GET /hub` - WebSocket push channel.
//!
//! The authenticating gateway in front of the hub puts the caller's username
//! in the `x-hub-user` header. The role is resolved through the User API
//! before the upgrade, so unknown users never get a socket.

use crate::errors::HubError;
use crate::hub::{ConnectionHandle, ControlFrame, HubSession};
use crate::routes::AppState;
use crate::services::DownstreamError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Header carrying the authenticated username.
pub const HUB_USER_HEADER: &str = "x-hub-user";

/// Handler for GET /hub
///
/// - 401 without the user header
/// - 403 when the User API does not know the user
/// - 502 when the User API is unavailable
#[instrument(skip_all, name = "hh.handlers.hub")]
pub async fn hub_socket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HubError> {
    let username = headers
        .get(HUB_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HubError::Unauthorized("Missing hub user".to_string()))?;

    let profile = state
        .user_api
        .get_user_profile(username)
        .await
        .map_err(|e| match e {
            DownstreamError::NotFound(_) => HubError::Forbidden("Unknown user".to_string()),
            other => HubError::Downstream(other),
        })?;

    let (connection, outbound) = ConnectionHandle::channel(
        profile.username.clone(),
        profile.is_officer(),
        state.config.connection_buffer,
    );
    let session = HubSession::new(
        connection.id,
        profile,
        state.dispatcher.hub().clone(),
        Arc::clone(&state.cache),
    );
    let shutdown = state.shutdown.clone();

    Ok(ws.on_upgrade(move |socket| run_socket(socket, session, connection, outbound, shutdown)))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

/// Drive one socket until the client leaves, the queue closes or the server stops.
async fn run_socket(
    mut socket: WebSocket,
    session: HubSession,
    connection: ConnectionHandle,
    mut outbound: mpsc::Receiver<Arc<str>>,
    shutdown: CancellationToken,
) {
    let connection_id = session.connection_id();
    let hub = session.hub().clone();

    if let Err(e) = hub.register(connection).await {
        warn!(target: "hh.hub", error = %e, "Failed to register hub connection");
        return;
    }
    let joined = match session.join_own_conferences().await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(target: "hh.hub", error = %e, "Failed to join own conferences");
            0
        }
    };
    info!(
        target: "hh.hub",
        connection_id = %connection_id,
        username = %session.profile().username,
        conferences = joined,
        "Hub connection opened"
    );

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = session.handle_text(&text).await;
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ControlFrame::Error {
                            message: "Binary frames are not supported".to_string(),
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the socket layer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(target: "hh.hub", error = %e, "Hub socket error");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = hub.unregister(connection_id).await {
        debug!(target: "hh.hub", error = %e, "Unregister after close failed");
    }
    info!(target: "hh.hub", connection_id = %connection_id, "Hub connection closed");
}
