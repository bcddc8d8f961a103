//! Turns accepted state changes into hub frames and picks their audience.

use super::actor::HubActorHandle;
use super::messages::{DeliveryReport, HubGroup, HubMessage};
use crate::errors::HubError;
use crate::events::guard::StateChange;
use crate::models::Conference;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Publishes domain notifications through the hub registry.
#[derive(Clone)]
pub struct HubDispatcher {
    hub: HubActorHandle,
}

impl HubDispatcher {
    pub fn new(hub: HubActorHandle) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &HubActorHandle {
        &self.hub
    }

    /// Groups that follow a conference: its own subscribers and its venue's.
    pub fn conference_audience(conference: &Conference) -> Vec<HubGroup> {
        vec![
            HubGroup::Conference(conference.id),
            HubGroup::venue(&conference.hearing_venue_name),
        ]
    }

    /// Serialize `message` once and push it to every connection in `groups`.
    ///
    /// # Errors
    ///
    /// `HubError::Internal` if the frame cannot be serialized or the hub actor is gone.
    pub async fn publish(
        &self,
        groups: Vec<HubGroup>,
        message: &HubMessage,
    ) -> Result<DeliveryReport, HubError> {
        let frame = serde_json::to_string(message)
            .map_err(|e| HubError::Internal(format!("failed to serialize hub frame: {e}")))?;

        let report = self.hub.publish(groups, Arc::from(frame)).await?;

        debug!(
            target: "hh.hub",
            event = message.name(),
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "Published hub frame"
        );
        Ok(report)
    }

    /// Publish the notifications for one accepted callback event.
    #[instrument(skip_all, name = "hh.hub.dispatch", fields(conference_id = %conference.id))]
    pub async fn publish_state_change(
        &self,
        conference: &Conference,
        change: &StateChange,
    ) -> Result<DeliveryReport, HubError> {
        let mut total = DeliveryReport::default();

        for (groups, message) in Self::plan(conference, change) {
            let report = self.publish(groups, &message).await?;
            total.recipients += report.recipients;
            total.delivered += report.delivered;
            total.dropped += report.dropped;
        }

        Ok(total)
    }

    /// Frames and audiences for a state change, in publish order.
    pub fn plan(conference: &Conference, change: &StateChange) -> Vec<(Vec<HubGroup>, HubMessage)> {
        let conference_id = conference.id;
        let audience = Self::conference_audience(conference);

        match change {
            StateChange::Participant(p) => {
                let mut plan = vec![(
                    audience.clone(),
                    HubMessage::ParticipantStatusMessage {
                        conference_id,
                        participant_id: p.participant_id,
                        username: p.username.clone(),
                        state: p.current,
                        room: p.room.clone(),
                        reason: p.reason.clone(),
                    },
                )];
                if let Some(transfer) = &p.transfer {
                    plan.push((
                        audience,
                        HubMessage::RoomTransfer {
                            conference_id,
                            participant_id: p.participant_id.to_string(),
                            from_room: transfer.from.clone(),
                            to_room: transfer.to.clone(),
                        },
                    ));
                }
                plan
            }
            StateChange::Conference { current, .. } => vec![(
                audience,
                HubMessage::ConferenceStatusMessage {
                    conference_id,
                    state: *current,
                },
            )],
            StateChange::Endpoint(e) => {
                let mut plan = vec![(
                    audience.clone(),
                    HubMessage::EndpointStatusMessage {
                        conference_id,
                        endpoint_id: e.endpoint_id,
                        state: e.current,
                        room: e.room.clone(),
                    },
                )];
                if let Some(transfer) = &e.transfer {
                    plan.push((
                        audience,
                        HubMessage::RoomTransfer {
                            conference_id,
                            participant_id: e.endpoint_id.to_string(),
                            from_room: transfer.from.clone(),
                            to_room: transfer.to.clone(),
                        },
                    ));
                }
                plan
            }
            StateChange::HelpRequested {
                participant_id,
                display_name,
                room,
            } => {
                let mut groups = audience;
                groups.push(HubGroup::Officers);
                vec![(
                    groups,
                    HubMessage::HelpMessage {
                        conference_id,
                        participant_id: *participant_id,
                        display_name: display_name.clone(),
                        room: room.clone(),
                    },
                )]
            }
            // Goes to the called participant only
            StateChange::VhoCall {
                participant_id,
                username,
            } => vec![(
                vec![HubGroup::user(username)],
                HubMessage::VhoCallMessage {
                    conference_id,
                    participant_id: *participant_id,
                    username: username.clone(),
                },
            )],
            StateChange::CountdownFinished => vec![(
                audience,
                HubMessage::HearingCountdownCompleteMessage { conference_id },
            )],
        }
    }
}
