//! Inbound callback payloads and their classification into typed events.

use crate::models::{RoomTransfer, RoomType, UnknownRoom};
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, EndpointId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raw callback as posted by the video platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEventRequest {
    pub event_id: String,
    pub event_type: String,
    pub time_stamp_utc: DateTime<Utc>,
    pub conference_id: ConferenceId,
    #[serde(default)]
    pub participant_id: Option<ParticipantId>,
    #[serde(default)]
    pub endpoint_id: Option<EndpointId>,
    #[serde(default)]
    pub transfer_from: Option<String>,
    #[serde(default)]
    pub transfer_to: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Callback event types understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ParticipantJoining,
    Joined,
    Disconnected,
    Leave,
    ParticipantNotSignedIn,
    SelfTestFailed,
    Transfer,
    Consultation,
    Help,
    VhoCall,
    Start,
    Pause,
    Suspend,
    Close,
    CountdownFinished,
    EndpointJoined,
    EndpointDisconnected,
    EndpointTransfer,
}

impl EventType {
    pub const ALL: [EventType; 18] = [
        EventType::ParticipantJoining,
        EventType::Joined,
        EventType::Disconnected,
        EventType::Leave,
        EventType::ParticipantNotSignedIn,
        EventType::SelfTestFailed,
        EventType::Transfer,
        EventType::Consultation,
        EventType::Help,
        EventType::VhoCall,
        EventType::Start,
        EventType::Pause,
        EventType::Suspend,
        EventType::Close,
        EventType::CountdownFinished,
        EventType::EndpointJoined,
        EventType::EndpointDisconnected,
        EventType::EndpointTransfer,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ParticipantJoining => "ParticipantJoining",
            EventType::Joined => "Joined",
            EventType::Disconnected => "Disconnected",
            EventType::Leave => "Leave",
            EventType::ParticipantNotSignedIn => "ParticipantNotSignedIn",
            EventType::SelfTestFailed => "SelfTestFailed",
            EventType::Transfer => "Transfer",
            EventType::Consultation => "Consultation",
            EventType::Help => "Help",
            EventType::VhoCall => "VhoCall",
            EventType::Start => "Start",
            EventType::Pause => "Pause",
            EventType::Suspend => "Suspend",
            EventType::Close => "Close",
            EventType::CountdownFinished => "CountdownFinished",
            EventType::EndpointJoined => "EndpointJoined",
            EventType::EndpointDisconnected => "EndpointDisconnected",
            EventType::EndpointTransfer => "EndpointTransfer",
        }
    }

    /// Look up a wire name, ignoring ASCII case. Unsupported names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantAction {
    Joining,
    Joined,
    Disconnected { reason: Option<String> },
    Leave,
    NotSignedIn,
    SelfTestFailed { reason: Option<String> },
    Transfer(RoomTransfer),
    /// Move into a consultation room. `from` defaults to the current room.
    Consultation { from: Option<RoomType>, to: RoomType },
    Help,
    VhoCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceAction {
    Start,
    Pause,
    Suspend,
    Close,
    CountdownFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAction {
    Joined,
    Disconnected { reason: Option<String> },
    Transfer(RoomTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Participant {
        participant_id: ParticipantId,
        action: ParticipantAction,
    },
    Conference(ConferenceAction),
    Endpoint {
        endpoint_id: EndpointId,
        action: EndpointAction,
    },
}

/// A classified callback, consumed exactly once by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub conference_id: ConferenceId,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("{event_type} event is missing required field '{field}'")]
    MissingField {
        event_type: EventType,
        field: &'static str,
    },

    #[error(transparent)]
    InvalidRoom(#[from] UnknownRoom),

    #[error("{event_type} event must target a consultation room, got {room}")]
    NotAConsultationRoom { event_type: EventType, room: RoomType },
}

/// Classify a raw callback.
///
/// Returns `Ok(None)` for event types the hub does not handle. A known type
/// missing the data it needs is an error.
pub fn classify(request: &CallbackEventRequest) -> Result<Option<CallbackEvent>, ClassifyError> {
    let Some(event_type) = EventType::from_name(&request.event_type) else {
        return Ok(None);
    };

    let participant = |action: ParticipantAction| -> Result<EventKind, ClassifyError> {
        let participant_id = request.participant_id.ok_or(ClassifyError::MissingField {
            event_type,
            field: "participant_id",
        })?;
        Ok(EventKind::Participant {
            participant_id,
            action,
        })
    };

    let endpoint = |action: EndpointAction| -> Result<EventKind, ClassifyError> {
        let endpoint_id = request.endpoint_id.ok_or(ClassifyError::MissingField {
            event_type,
            field: "endpoint_id",
        })?;
        Ok(EventKind::Endpoint {
            endpoint_id,
            action,
        })
    };

    let room = |value: &Option<String>, field: &'static str| -> Result<RoomType, ClassifyError> {
        let raw = value
            .as_deref()
            .ok_or(ClassifyError::MissingField { event_type, field })?;
        Ok(raw.parse::<RoomType>()?)
    };

    let transfer = || -> Result<RoomTransfer, ClassifyError> {
        Ok(RoomTransfer::new(
            room(&request.transfer_from, "transfer_from")?,
            room(&request.transfer_to, "transfer_to")?,
        ))
    };

    let kind = match event_type {
        EventType::ParticipantJoining => participant(ParticipantAction::Joining)?,
        EventType::Joined => participant(ParticipantAction::Joined)?,
        EventType::Disconnected => participant(ParticipantAction::Disconnected {
            reason: request.reason.clone(),
        })?,
        EventType::Leave => participant(ParticipantAction::Leave)?,
        EventType::ParticipantNotSignedIn => participant(ParticipantAction::NotSignedIn)?,
        EventType::SelfTestFailed => participant(ParticipantAction::SelfTestFailed {
            reason: request.reason.clone(),
        })?,
        EventType::Transfer => participant(ParticipantAction::Transfer(transfer()?))?,
        EventType::Consultation => {
            let to = room(&request.transfer_to, "transfer_to")?;
            if !to.is_consultation() {
                return Err(ClassifyError::NotAConsultationRoom {
                    event_type,
                    room: to,
                });
            }
            let from = match request.transfer_from.as_deref() {
                Some(raw) => Some(raw.parse::<RoomType>()?),
                None => None,
            };
            participant(ParticipantAction::Consultation { from, to })?
        }
        EventType::Help => participant(ParticipantAction::Help)?,
        EventType::VhoCall => participant(ParticipantAction::VhoCall)?,
        EventType::Start => EventKind::Conference(ConferenceAction::Start),
        EventType::Pause => EventKind::Conference(ConferenceAction::Pause),
        EventType::Suspend => EventKind::Conference(ConferenceAction::Suspend),
        EventType::Close => EventKind::Conference(ConferenceAction::Close),
        EventType::CountdownFinished => EventKind::Conference(ConferenceAction::CountdownFinished),
        EventType::EndpointJoined => endpoint(EndpointAction::Joined)?,
        EventType::EndpointDisconnected => endpoint(EndpointAction::Disconnected {
            reason: request.reason.clone(),
        })?,
        EventType::EndpointTransfer => endpoint(EndpointAction::Transfer(transfer()?))?,
    };

    Ok(Some(CallbackEvent {
        event_id: request.event_id.clone(),
        event_type,
        conference_id: request.conference_id,
        occurred_at: request.time_stamp_utc,
        kind,
    }))
}
