//! Hub wire frames and registry actor messages.
//!
//! Every frame pushed to a client is `{"event": <name>, "data": {...}}`.

use super::connection::{ConnectionHandle, ConnectionId};
use crate::errors::HubError;
use crate::models::{
    AllocatedHearing, ConferenceState, EndpointState, Participant, ParticipantState, RoomType,
};
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, EndpointId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Domain notifications pushed to hub clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubMessage {
    ParticipantStatusMessage {
        conference_id: ConferenceId,
        participant_id: ParticipantId,
        username: String,
        state: ParticipantState,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ConferenceStatusMessage {
        conference_id: ConferenceId,
        state: ConferenceState,
    },
    RoomTransfer {
        conference_id: ConferenceId,
        /// Participant or endpoint id.
        participant_id: String,
        from_room: RoomType,
        to_room: RoomType,
    },
    EndpointStatusMessage {
        conference_id: ConferenceId,
        endpoint_id: EndpointId,
        state: EndpointState,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomType>,
    },
    HelpMessage {
        conference_id: ConferenceId,
        participant_id: ParticipantId,
        display_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomType>,
    },
    VhoCallMessage {
        conference_id: ConferenceId,
        participant_id: ParticipantId,
        username: String,
    },
    HearingCountdownCompleteMessage {
        conference_id: ConferenceId,
    },
    ParticipantsUpdatedMessage {
        conference_id: ConferenceId,
        participants: Vec<Participant>,
    },
    NewConferenceAddedMessage {
        conference_id: ConferenceId,
        case_name: String,
        hearing_venue_name: String,
        scheduled_at: DateTime<Utc>,
    },
    AllocationsUpdated {
        cso_username: String,
        hearings: Vec<AllocatedHearing>,
    },
    HearingCancelledMessage {
        conference_id: ConferenceId,
    },
}

impl HubMessage {
    /// Wire name of the frame, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            HubMessage::ParticipantStatusMessage { .. } => "ParticipantStatusMessage",
            HubMessage::ConferenceStatusMessage { .. } => "ConferenceStatusMessage",
            HubMessage::RoomTransfer { .. } => "RoomTransfer",
            HubMessage::EndpointStatusMessage { .. } => "EndpointStatusMessage",
            HubMessage::HelpMessage { .. } => "HelpMessage",
            HubMessage::VhoCallMessage { .. } => "VhoCallMessage",
            HubMessage::HearingCountdownCompleteMessage { .. } => {
                "HearingCountdownCompleteMessage"
            }
            HubMessage::ParticipantsUpdatedMessage { .. } => "ParticipantsUpdatedMessage",
            HubMessage::NewConferenceAddedMessage { .. } => "NewConferenceAddedMessage",
            HubMessage::AllocationsUpdated { .. } => "AllocationsUpdated",
            HubMessage::HearingCancelledMessage { .. } => "HearingCancelledMessage",
        }
    }
}

/// Replies to client requests on the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ControlFrame {
    Subscribed { group: String },
    Unsubscribed { group: String },
    Pong,
    Error { message: String },
}

/// Requests a client may send over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeConference { conference_id: ConferenceId },
    UnsubscribeConference { conference_id: ConferenceId },
    SubscribeVenue { venue: String },
    UnsubscribeVenue { venue: String },
    Ping,
}

/// Audience a connection can belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HubGroup {
    Conference(ConferenceId),
    /// Venue names compare case-insensitively; build through [`HubGroup::venue`].
    Venue(String),
    Officers,
    /// Every connection of one user. Joined automatically on register.
    User(String),
}

impl HubGroup {
    pub fn venue(name: &str) -> Self {
        HubGroup::Venue(name.trim().to_lowercase())
    }

    pub fn user(username: &str) -> Self {
        HubGroup::User(username.trim().to_lowercase())
    }
}

impl fmt::Display for HubGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubGroup::Conference(id) => write!(f, "conference:{id}"),
            HubGroup::Venue(name) => write!(f, "venue:{name}"),
            HubGroup::Officers => write!(f, "officers"),
            HubGroup::User(name) => write!(f, "user:{name}"),
        }
    }
}

/// Result of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Distinct connections in the audience.
    pub recipients: usize,
    pub delivered: usize,
    /// Full or closed queues.
    pub dropped: usize,
}

/// Snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStatus {
    pub connections: usize,
    pub groups: usize,
}

/// Messages sent to `HubActor`.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection and its automatic groups.
    Register {
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<()>,
    },

    /// Remove a connection from the registry and every group.
    Unregister {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<()>,
    },

    Join {
        connection_id: ConnectionId,
        group: HubGroup,
        respond_to: oneshot::Sender<Result<(), HubError>>,
    },

    Leave {
        connection_id: ConnectionId,
        group: HubGroup,
        respond_to: oneshot::Sender<()>,
    },

    /// Push an already serialized frame to the union of `groups`.
    Publish {
        groups: Vec<HubGroup>,
        frame: Arc<str>,
        respond_to: oneshot::Sender<DeliveryReport>,
    },

    GetStatus {
        respond_to: oneshot::Sender<HubStatus>,
    },
}
