//! Conference read model.
//!
//! A [`Conference`] is owned by the conference cache and only changes through
//! accepted callback events or a reload from the Video API.

pub mod room;

pub use room::{RoomTransfer, RoomTransferError, RoomType, UnknownRoom};

use chrono::{DateTime, Utc};
use common::types::{ConferenceId, EndpointId, HearingId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the hearing itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConferenceState {
    NotStarted,
    InSession,
    Paused,
    Suspended,
    Closed,
}

/// Live status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    NotSignedIn,
    UnableToJoin,
    Joining,
    Available,
    InHearing,
    InConsultation,
    Disconnected,
}

/// Live status of a video endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointState {
    NotYetJoined,
    Connected,
    InConsultation,
    Disconnected,
}

/// Role of a user, both inside a conference and in their profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Judge,
    Individual,
    Representative,
    CaseAdmin,
    VideoHearingsOfficer,
    HearingFacilitationSupport,
}

impl Role {
    /// Officers monitor hearings across conferences and venues.
    #[must_use]
    pub fn is_officer(self) -> bool {
        matches!(self, Role::VideoHearingsOfficer)
    }
}

macro_rules! display_as_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

display_as_debug!(ConferenceState, ParticipantState, EndpointState, Role);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub state: ParticipantState,
    pub current_room: Option<RoomType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub display_name: String,
    pub sip_address: String,
    pub state: EndpointState,
    pub current_room: Option<RoomType>,
}

/// A scheduled virtual courtroom session and everyone attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conference {
    pub id: ConferenceId,
    pub hearing_id: HearingId,
    pub case_name: String,
    pub case_number: String,
    pub case_type: String,
    pub hearing_venue_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub scheduled_duration_minutes: u32,
    pub state: ConferenceState,
    pub participants: Vec<Participant>,
    pub endpoints: Vec<Endpoint>,
    pub allocated_cso: Option<String>,
}

impl Conference {
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id == id)
    }

    /// Whether `username` is a participant of this conference.
    ///
    /// Usernames are email addresses, so the comparison ignores case.
    #[must_use]
    pub fn has_participant_username(&self, username: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.username.eq_ignore_ascii_case(username))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ConferenceState::Closed
    }
}

/// Profile returned by the User API for a connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl UserProfile {
    #[must_use]
    pub fn is_officer(&self) -> bool {
        self.roles.iter().any(|r| r.is_officer())
    }
}

/// A hearing allocated to a CSO, as pushed to that officer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedHearing {
    pub conference_id: ConferenceId,
    pub case_name: String,
    pub hearing_venue_name: String,
    pub scheduled_at: DateTime<Utc>,
}

impl From<&Conference> for AllocatedHearing {
    fn from(conference: &Conference) -> Self {
        Self {
            conference_id: conference.id,
            case_name: conference.case_name.clone(),
            hearing_venue_name: conference.hearing_venue_name.clone(),
            scheduled_at: conference.scheduled_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn participant(username: &str, role: Role) -> Participant {
        Participant {
            id: ParticipantId::new(),
            username: username.to_string(),
            display_name: username.to_string(),
            role,
            state: ParticipantState::NotSignedIn,
            current_room: None,
        }
    }

    fn conference(participants: Vec<Participant>) -> Conference {
        Conference {
            id: ConferenceId::new(),
            hearing_id: HearingId::new(),
            case_name: "Smith v Jones".to_string(),
            case_number: "CN-001".to_string(),
            case_type: "Civil".to_string(),
            hearing_venue_name: "Birmingham Civil".to_string(),
            scheduled_at: Utc::now(),
            scheduled_duration_minutes: 60,
            state: ConferenceState::NotStarted,
            participants,
            endpoints: Vec::new(),
            allocated_cso: None,
        }
    }

    #[test]
    fn test_only_vho_is_officer() {
        assert!(Role::VideoHearingsOfficer.is_officer());
        for role in [
            Role::Judge,
            Role::Individual,
            Role::Representative,
            Role::CaseAdmin,
            Role::HearingFacilitationSupport,
        ] {
            assert!(!role.is_officer(), "{role} should not be an officer");
        }
    }

    #[test]
    fn test_username_lookup_ignores_case() {
        let conf = conference(vec![participant("Judge.One@court.test", Role::Judge)]);
        assert!(conf.has_participant_username("judge.one@court.test"));
        assert!(!conf.has_participant_username("someone.else@court.test"));
    }

    #[test]
    fn test_participant_lookup_by_id() {
        let p = participant("rep@law.test", Role::Representative);
        let id = p.id;
        let mut conf = conference(vec![p]);

        assert_eq!(conf.participant(id).map(|p| p.role), Some(Role::Representative));
        conf.participant_mut(id).unwrap().state = ParticipantState::Joining;
        assert_eq!(conf.participant(id).unwrap().state, ParticipantState::Joining);
        assert!(conf.participant(ParticipantId::new()).is_none());
    }

    #[test]
    fn test_profile_officer_flag() {
        let profile = UserProfile {
            username: "vho@court.test".to_string(),
            display_name: "VHO".to_string(),
            roles: vec![Role::CaseAdmin, Role::VideoHearingsOfficer],
        };
        assert!(profile.is_officer());
    }
}
