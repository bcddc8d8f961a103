//! Conference and user fixtures.

use chrono::{Duration, Utc};
use common::types::{ConferenceId, EndpointId, HearingId, ParticipantId};
use hearing_hub::models::{
    Conference, ConferenceState, Endpoint, EndpointState, Participant, ParticipantState, Role,
    UserProfile,
};

/// Builder for a conference with a chosen set of participants.
///
/// # Example
/// ```rust,ignore
/// let conference = ConferenceBuilder::new("Leeds")
///     .judge("judge@court.test")
///     .individual("claimant@court.test")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConferenceBuilder {
    conference: Conference,
}

impl ConferenceBuilder {
    pub fn new(venue: &str) -> Self {
        Self {
            conference: Conference {
                id: ConferenceId::new(),
                hearing_id: HearingId::new(),
                case_name: "Test Case v Fixture".to_string(),
                case_number: "TC-0001".to_string(),
                case_type: "Civil Money Claims".to_string(),
                hearing_venue_name: venue.to_string(),
                scheduled_at: Utc::now() + Duration::hours(1),
                scheduled_duration_minutes: 60,
                state: ConferenceState::NotStarted,
                participants: Vec::new(),
                endpoints: Vec::new(),
                allocated_cso: None,
            },
        }
    }

    pub fn case_name(mut self, case_name: &str) -> Self {
        self.conference.case_name = case_name.to_string();
        self
    }

    pub fn state(mut self, state: ConferenceState) -> Self {
        self.conference.state = state;
        self
    }

    pub fn participant(mut self, username: &str, role: Role, state: ParticipantState) -> Self {
        self.conference.participants.push(Participant {
            id: ParticipantId::new(),
            username: username.to_string(),
            display_name: display_name(username),
            role,
            state,
            current_room: None,
        });
        self
    }

    pub fn judge(self, username: &str) -> Self {
        self.participant(username, Role::Judge, ParticipantState::NotSignedIn)
    }

    pub fn individual(self, username: &str) -> Self {
        self.participant(username, Role::Individual, ParticipantState::NotSignedIn)
    }

    pub fn endpoint(mut self, display_name: &str) -> Self {
        self.conference.endpoints.push(Endpoint {
            id: EndpointId::new(),
            display_name: display_name.to_string(),
            sip_address: format!("{}@sip.court.test", display_name.to_ascii_lowercase()),
            state: EndpointState::NotYetJoined,
            current_room: None,
        });
        self
    }

    pub fn build(self) -> Conference {
        self.conference
    }
}

/// Id of the participant with `username`.
///
/// Panics if the conference has no such participant.
pub fn participant_id(conference: &Conference, username: &str) -> ParticipantId {
    conference
        .participants
        .iter()
        .find(|p| p.username == username)
        .map(|p| p.id)
        .expect("fixture participant exists")
}

/// Profile for a hub user with a single role.
pub fn profile(username: &str, role: Role) -> UserProfile {
    UserProfile {
        username: username.to_string(),
        display_name: display_name(username),
        roles: vec![role],
    }
}

fn display_name(username: &str) -> String {
    username.split('@').next().unwrap_or(username).to_string()
}
