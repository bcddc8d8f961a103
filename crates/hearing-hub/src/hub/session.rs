//! Per-socket request handling.
//!
//! A session answers the client's subscribe, unsubscribe and ping requests
//! for one registered connection. Socket I/O lives in the HTTP handler.

use super::actor::HubActorHandle;
use super::connection::ConnectionId;
use super::messages::{ClientMessage, ControlFrame, HubGroup};
use crate::cache::ConferenceCache;
use crate::errors::HubError;
use crate::models::UserProfile;
use common::types::ConferenceId;
use std::sync::Arc;
use tracing::debug;

pub struct HubSession {
    connection_id: ConnectionId,
    profile: UserProfile,
    hub: HubActorHandle,
    cache: Arc<ConferenceCache>,
}

impl HubSession {
    pub fn new(
        connection_id: ConnectionId,
        profile: UserProfile,
        hub: HubActorHandle,
        cache: Arc<ConferenceCache>,
    ) -> Self {
        Self {
            connection_id,
            profile,
            hub,
            cache,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn hub(&self) -> &HubActorHandle {
        &self.hub
    }

    /// Follow every cached conference the user takes part in.
    ///
    /// Officers see every conference through their own group and are skipped.
    /// Returns the number of conferences joined.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub actor is gone.
    pub async fn join_own_conferences(&self) -> Result<usize, HubError> {
        if self.profile.is_officer() {
            return Ok(0);
        }

        let conference_ids = self
            .cache
            .conferences_with_participant(&self.profile.username)
            .await;
        for conference_id in &conference_ids {
            self.hub
                .join(self.connection_id, HubGroup::Conference(*conference_id))
                .await?;
        }
        Ok(conference_ids.len())
    }

    /// Parse and answer one text frame. Failures become an `Error` frame.
    pub async fn handle_text(&self, text: &str) -> ControlFrame {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                return ControlFrame::Error {
                    message: format!("Invalid message: {e}"),
                }
            }
        };

        match self.handle(message).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    target: "hh.hub",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Client request refused"
                );
                ControlFrame::Error {
                    message: client_error_message(&e),
                }
            }
        }
    }

    /// Answer one client request.
    ///
    /// # Errors
    ///
    /// - `HubError::Forbidden` when the user may not follow the requested group
    /// - `HubError::ConferenceNotFound` for an unknown conference
    /// - cache and hub failures otherwise
    pub async fn handle(&self, message: ClientMessage) -> Result<ControlFrame, HubError> {
        match message {
            ClientMessage::SubscribeConference { conference_id } => {
                self.authorize_conference(conference_id).await?;
                self.subscribe(HubGroup::Conference(conference_id)).await
            }
            ClientMessage::UnsubscribeConference { conference_id } => {
                self.unsubscribe(HubGroup::Conference(conference_id)).await
            }
            ClientMessage::SubscribeVenue { venue } => {
                if !self.profile.is_officer() {
                    return Err(HubError::Forbidden(
                        "Only officers may follow a venue".to_string(),
                    ));
                }
                self.subscribe(HubGroup::venue(&venue)).await
            }
            ClientMessage::UnsubscribeVenue { venue } => {
                self.unsubscribe(HubGroup::venue(&venue)).await
            }
            ClientMessage::Ping => Ok(ControlFrame::Pong),
        }
    }

    /// Officers may follow any conference; anyone else only their own.
    async fn authorize_conference(&self, conference_id: ConferenceId) -> Result<(), HubError> {
        let conference = self.cache.get_or_add(conference_id).await?;
        if self.profile.is_officer() || conference.has_participant_username(&self.profile.username)
        {
            Ok(())
        } else {
            Err(HubError::Forbidden(format!(
                "Not a participant of conference {conference_id}"
            )))
        }
    }

    async fn subscribe(&self, group: HubGroup) -> Result<ControlFrame, HubError> {
        let name = group.to_string();
        self.hub.join(self.connection_id, group).await?;
        Ok(ControlFrame::Subscribed { group: name })
    }

    async fn unsubscribe(&self, group: HubGroup) -> Result<ControlFrame, HubError> {
        let name = group.to_string();
        self.hub.leave(self.connection_id, group).await?;
        Ok(ControlFrame::Unsubscribed { group: name })
    }
}

/// Message safe to show a client.
fn client_error_message(error: &HubError) -> String {
    match error {
        HubError::ConferenceNotFound(_)
        | HubError::NotFound(_)
        | HubError::BadRequest(_)
        | HubError::Forbidden(_)
        | HubError::Unauthorized(_) => error.to_string(),
        HubError::ConferenceBusy(_) => "Conference is busy. Please retry.".to_string(),
        HubError::Downstream(_) => "A downstream service is unavailable".to_string(),
        HubError::Internal(_) => "An internal error occurred".to_string(),
    }
}
