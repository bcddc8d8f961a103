//! Virtual rooms and the transfer table between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const WAITING_ROOM: &str = "WaitingRoom";
const HEARING_ROOM: &str = "HearingRoom";
const CONSULTATION_ROOM_MARKER: &str = "ConsultationRoom";

/// A virtual room a participant or endpoint can occupy.
///
/// Consultation rooms are numbered and prefixed by their kind on the video
/// platform (`ParticipantConsultationRoom1`, `JudgeJOHConsultationRoom2`),
/// so the full label is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomType {
    WaitingRoom,
    HearingRoom,
    ConsultationRoom { label: String },
}

impl RoomType {
    /// Build a consultation room from its platform label.
    pub fn consultation(label: impl Into<String>) -> Self {
        RoomType::ConsultationRoom {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn is_consultation(&self) -> bool {
        matches!(self, RoomType::ConsultationRoom { .. })
    }

    /// Name as used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RoomType::WaitingRoom => WAITING_ROOM,
            RoomType::HearingRoom => HEARING_ROOM,
            RoomType::ConsultationRoom { label } => label,
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown room: {0}")]
pub struct UnknownRoom(pub String);

impl FromStr for RoomType {
    type Err = UnknownRoom;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            WAITING_ROOM => Ok(RoomType::WaitingRoom),
            HEARING_ROOM => Ok(RoomType::HearingRoom),
            other if other.contains(CONSULTATION_ROOM_MARKER) => {
                Ok(RoomType::consultation(other))
            }
            other => Err(UnknownRoom(other.to_string())),
        }
    }
}

impl TryFrom<String> for RoomType {
    type Error = UnknownRoom;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomType> for String {
    fn from(value: RoomType) -> Self {
        match value {
            RoomType::ConsultationRoom { label } => label,
            other => other.as_str().to_string(),
        }
    }
}

/// Raised when a move between two rooms is not in the transfer table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Room transfer from {from} to {to} is not permitted")]
pub struct RoomTransferError {
    pub from: RoomType,
    pub to: RoomType,
}

/// A requested move from one room to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTransfer {
    pub from: RoomType,
    pub to: RoomType,
}

impl RoomTransfer {
    pub fn new(from: RoomType, to: RoomType) -> Self {
        Self { from, to }
    }

    /// Check the pair against the transfer table.
    ///
    /// Permitted: waiting <-> hearing, waiting <-> consultation, and
    /// consultation -> a different consultation room.
    pub fn validate(&self) -> Result<(), RoomTransferError> {
        use RoomType::{ConsultationRoom, HearingRoom, WaitingRoom};

        let allowed = match (&self.from, &self.to) {
            (WaitingRoom, HearingRoom)
            | (HearingRoom, WaitingRoom)
            | (WaitingRoom, ConsultationRoom { .. })
            | (ConsultationRoom { .. }, WaitingRoom) => true,
            (ConsultationRoom { label: from }, ConsultationRoom { label: to }) => from != to,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(RoomTransferError {
                from: self.from.clone(),
                to: self.to.clone(),
            })
        }
    }
}
