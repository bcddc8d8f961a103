//! Event ordering guard.
//!
//! Every classified callback is checked against the current position of its
//! subject (participant, endpoint or the conference itself) before anything
//! is mutated. [`evaluate`] computes the resulting [`StateChange`] from a
//! shared reference; [`apply`] evaluates and then writes the change, so a
//! rejected event never leaves a partial update behind.
//!
//! Participant transitions:
//!
//! ```text
//! NotSignedIn -> Joining -> Available -> InHearing | InConsultation -> Disconnected
//! ```
//!
//! Conference `Paused`/`Suspended` are overlays on the hearing and do not gate
//! participant events.

use super::callback::{
    CallbackEvent, ConferenceAction, EndpointAction, EventKind, ParticipantAction,
};
use crate::models::{
    Conference, ConferenceState, EndpointState, ParticipantState, RoomTransfer,
    RoomTransferError, RoomType,
};
use common::types::{EndpointId, ParticipantId};
use std::fmt;
use thiserror::Error;

use ConferenceState as C;
use EndpointState as E;
use ParticipantState as P;

const JOINING_FROM: &[P] = &[P::NotSignedIn, P::UnableToJoin, P::Disconnected];
const SELF_TEST_FAILED_FROM: &[P] = &[P::NotSignedIn, P::Joining];
const JOINED_FROM: &[P] = &[P::Joining];
const DISCONNECT_FROM: &[P] = &[P::Joining, P::Available, P::InHearing, P::InConsultation];
const NOT_SIGNED_IN_FROM: &[P] = &[P::NotSignedIn, P::UnableToJoin, P::Disconnected];
const TRANSFER_FROM: &[P] = &[P::Available, P::InHearing, P::InConsultation];
const CONSULTATION_FROM: &[P] = &[P::Available, P::InConsultation];
const SIGNED_IN: &[P] = &[
    P::UnableToJoin,
    P::Joining,
    P::Available,
    P::InHearing,
    P::InConsultation,
    P::Disconnected,
];

const START_FROM: &[C] = &[C::NotStarted, C::Paused, C::Suspended];
const PAUSE_FROM: &[C] = &[C::InSession];
const SUSPEND_FROM: &[C] = &[C::InSession, C::Paused];
const CLOSE_FROM: &[C] = &[C::InSession, C::Paused, C::Suspended];
const COUNTDOWN_FROM: &[C] = &[C::InSession];

const ENDPOINT_JOINED_FROM: &[E] = &[E::NotYetJoined, E::Disconnected];
const ENDPOINT_DISCONNECT_FROM: &[E] = &[E::Connected, E::InConsultation];
const ENDPOINT_TRANSFER_FROM: &[E] = &[E::Connected, E::InConsultation];

/// The precondition an event failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateViolation {
    Participant {
        participant_id: ParticipantId,
        actual: ParticipantState,
        expected: &'static [ParticipantState],
    },
    Conference {
        actual: ConferenceState,
        expected: &'static [ConferenceState],
    },
    Endpoint {
        endpoint_id: EndpointId,
        actual: EndpointState,
        expected: &'static [EndpointState],
    },
    /// The event names a source room the subject is not in.
    RoomMismatch {
        actual: Option<RoomType>,
        claimed: RoomType,
    },
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateViolation::Participant {
                participant_id,
                actual,
                expected,
            } => {
                write!(f, "participant {participant_id} is {actual}, expected one of [")?;
                write_list(f, expected)?;
                f.write_str("]")
            }
            StateViolation::Conference { actual, expected } => {
                write!(f, "conference is {actual}, expected one of [")?;
                write_list(f, expected)?;
                f.write_str("]")
            }
            StateViolation::Endpoint {
                endpoint_id,
                actual,
                expected,
            } => {
                write!(f, "endpoint {endpoint_id} is {actual}, expected one of [")?;
                write_list(f, expected)?;
                f.write_str("]")
            }
            StateViolation::RoomMismatch { actual, claimed } => match actual {
                Some(room) => write!(f, "current room is {room}, event claims {claimed}"),
                None => write!(f, "not in any room, event claims {claimed}"),
            },
        }
    }
}

impl std::error::Error for StateViolation {}

/// An event arrived that the subject's current state cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Unexpected {} event {} for conference {}",
    .event.event_type,
    .event.event_id,
    .event.conference_id
)]
pub struct UnexpectedEventOrder {
    pub event: Box<CallbackEvent>,
    #[source]
    pub violation: StateViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error(transparent)]
    OrderViolation(#[from] UnexpectedEventOrder),

    #[error(transparent)]
    InvalidTransfer(#[from] RoomTransferError),

    #[error("Participant {0} not found in conference")]
    ParticipantNotFound(ParticipantId),

    #[error("Endpoint {0} not found in conference")]
    EndpointNotFound(EndpointId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantChange {
    pub participant_id: ParticipantId,
    pub username: String,
    pub previous: ParticipantState,
    pub current: ParticipantState,
    pub room: Option<RoomType>,
    pub transfer: Option<RoomTransfer>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointChange {
    pub endpoint_id: EndpointId,
    pub previous: EndpointState,
    pub current: EndpointState,
    pub room: Option<RoomType>,
    pub transfer: Option<RoomTransfer>,
    pub reason: Option<String>,
}

/// Outcome of an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Participant(ParticipantChange),
    Conference {
        previous: ConferenceState,
        current: ConferenceState,
    },
    Endpoint(EndpointChange),
    HelpRequested {
        participant_id: ParticipantId,
        display_name: String,
        room: Option<RoomType>,
    },
    VhoCall {
        participant_id: ParticipantId,
        username: String,
    },
    CountdownFinished,
}

/// Validate `event` and, if accepted, write the new state into `conference`.
pub fn apply(conference: &mut Conference, event: &CallbackEvent) -> Result<StateChange, GuardError> {
    let change = evaluate(conference, event)?;
    commit(conference, &change);
    Ok(change)
}

/// Compute the change `event` would make without touching `conference`.
pub fn evaluate(conference: &Conference, event: &CallbackEvent) -> Result<StateChange, GuardError> {
    match &event.kind {
        EventKind::Participant {
            participant_id,
            action,
        } => evaluate_participant(conference, event, *participant_id, action),
        EventKind::Conference(action) => evaluate_conference(conference, event, *action),
        EventKind::Endpoint {
            endpoint_id,
            action,
        } => evaluate_endpoint(conference, event, *endpoint_id, action),
    }
}

fn commit(conference: &mut Conference, change: &StateChange) {
    match change {
        StateChange::Participant(c) => {
            if let Some(participant) = conference.participant_mut(c.participant_id) {
                participant.state = c.current;
                participant.current_room.clone_from(&c.room);
            }
        }
        StateChange::Conference { current, .. } => conference.state = *current,
        StateChange::Endpoint(c) => {
            if let Some(endpoint) = conference.endpoint_mut(c.endpoint_id) {
                endpoint.state = c.current;
                endpoint.current_room.clone_from(&c.room);
            }
        }
        StateChange::HelpRequested { .. } | StateChange::VhoCall { .. } | StateChange::CountdownFinished => {}
    }
}

fn order_violation(event: &CallbackEvent, violation: StateViolation) -> GuardError {
    GuardError::OrderViolation(UnexpectedEventOrder {
        event: Box::new(event.clone()),
        violation,
    })
}

fn participant_state_for(room: &RoomType) -> ParticipantState {
    match room {
        RoomType::WaitingRoom => P::Available,
        RoomType::HearingRoom => P::InHearing,
        RoomType::ConsultationRoom { .. } => P::InConsultation,
    }
}

fn endpoint_state_for(room: &RoomType) -> EndpointState {
    if room.is_consultation() {
        E::InConsultation
    } else {
        E::Connected
    }
}

fn evaluate_participant(
    conference: &Conference,
    event: &CallbackEvent,
    participant_id: ParticipantId,
    action: &ParticipantAction,
) -> Result<StateChange, GuardError> {
    let participant = conference
        .participant(participant_id)
        .ok_or(GuardError::ParticipantNotFound(participant_id))?;

    let require = |expected: &'static [ParticipantState]| -> Result<(), GuardError> {
        if expected.contains(&participant.state) {
            Ok(())
        } else {
            Err(order_violation(
                event,
                StateViolation::Participant {
                    participant_id,
                    actual: participant.state,
                    expected,
                },
            ))
        }
    };

    let require_room = |claimed: &RoomType| -> Result<(), GuardError> {
        if participant.current_room.as_ref() == Some(claimed) {
            Ok(())
        } else {
            Err(order_violation(
                event,
                StateViolation::RoomMismatch {
                    actual: participant.current_room.clone(),
                    claimed: claimed.clone(),
                },
            ))
        }
    };

    let change = |current: ParticipantState,
                  room: Option<RoomType>,
                  transfer: Option<RoomTransfer>,
                  reason: Option<String>| {
        StateChange::Participant(ParticipantChange {
            participant_id,
            username: participant.username.clone(),
            previous: participant.state,
            current,
            room,
            transfer,
            reason,
        })
    };

    match action {
        ParticipantAction::Joining => {
            require(JOINING_FROM)?;
            Ok(change(P::Joining, None, None, None))
        }
        ParticipantAction::SelfTestFailed { reason } => {
            require(SELF_TEST_FAILED_FROM)?;
            Ok(change(P::UnableToJoin, None, None, reason.clone()))
        }
        ParticipantAction::Joined => {
            require(JOINED_FROM)?;
            Ok(change(P::Available, Some(RoomType::WaitingRoom), None, None))
        }
        ParticipantAction::Disconnected { reason } => {
            require(DISCONNECT_FROM)?;
            Ok(change(P::Disconnected, None, None, reason.clone()))
        }
        ParticipantAction::Leave => {
            require(DISCONNECT_FROM)?;
            Ok(change(P::Disconnected, None, None, None))
        }
        ParticipantAction::NotSignedIn => {
            require(NOT_SIGNED_IN_FROM)?;
            Ok(change(P::NotSignedIn, None, None, None))
        }
        ParticipantAction::Transfer(transfer) => {
            transfer.validate()?;
            require(TRANSFER_FROM)?;
            require_room(&transfer.from)?;
            Ok(change(
                participant_state_for(&transfer.to),
                Some(transfer.to.clone()),
                Some(transfer.clone()),
                None,
            ))
        }
        ParticipantAction::Consultation { from, to } => {
            require(CONSULTATION_FROM)?;
            let source = match from {
                Some(claimed) => {
                    require_room(claimed)?;
                    claimed.clone()
                }
                None => participant.current_room.clone().ok_or_else(|| {
                    order_violation(
                        event,
                        StateViolation::RoomMismatch {
                            actual: None,
                            claimed: to.clone(),
                        },
                    )
                })?,
            };
            let transfer = RoomTransfer::new(source, to.clone());
            transfer.validate()?;
            Ok(change(
                P::InConsultation,
                Some(to.clone()),
                Some(transfer),
                None,
            ))
        }
        ParticipantAction::Help => {
            require(SIGNED_IN)?;
            Ok(StateChange::HelpRequested {
                participant_id,
                display_name: participant.display_name.clone(),
                room: participant.current_room.clone(),
            })
        }
        ParticipantAction::VhoCall => {
            require(SIGNED_IN)?;
            Ok(StateChange::VhoCall {
                participant_id,
                username: participant.username.clone(),
            })
        }
    }
}

fn evaluate_conference(
    conference: &Conference,
    event: &CallbackEvent,
    action: ConferenceAction,
) -> Result<StateChange, GuardError> {
    let (expected, next) = match action {
        ConferenceAction::Start => (START_FROM, C::InSession),
        ConferenceAction::Pause => (PAUSE_FROM, C::Paused),
        ConferenceAction::Suspend => (SUSPEND_FROM, C::Suspended),
        ConferenceAction::Close => (CLOSE_FROM, C::Closed),
        ConferenceAction::CountdownFinished => (COUNTDOWN_FROM, C::InSession),
    };

    if !expected.contains(&conference.state) {
        return Err(order_violation(
            event,
            StateViolation::Conference {
                actual: conference.state,
                expected,
            },
        ));
    }

    if action == ConferenceAction::CountdownFinished {
        return Ok(StateChange::CountdownFinished);
    }

    Ok(StateChange::Conference {
        previous: conference.state,
        current: next,
    })
}

fn evaluate_endpoint(
    conference: &Conference,
    event: &CallbackEvent,
    endpoint_id: EndpointId,
    action: &EndpointAction,
) -> Result<StateChange, GuardError> {
    let endpoint = conference
        .endpoint(endpoint_id)
        .ok_or(GuardError::EndpointNotFound(endpoint_id))?;

    let require = |expected: &'static [EndpointState]| -> Result<(), GuardError> {
        if expected.contains(&endpoint.state) {
            Ok(())
        } else {
            Err(order_violation(
                event,
                StateViolation::Endpoint {
                    endpoint_id,
                    actual: endpoint.state,
                    expected,
                },
            ))
        }
    };

    let (current, room, transfer, reason) = match action {
        EndpointAction::Joined => {
            require(ENDPOINT_JOINED_FROM)?;
            (E::Connected, Some(RoomType::WaitingRoom), None, None)
        }
        EndpointAction::Disconnected { reason } => {
            require(ENDPOINT_DISCONNECT_FROM)?;
            (E::Disconnected, None, None, reason.clone())
        }
        EndpointAction::Transfer(transfer) => {
            transfer.validate()?;
            require(ENDPOINT_TRANSFER_FROM)?;
            if endpoint.current_room.as_ref() != Some(&transfer.from) {
                return Err(order_violation(
                    event,
                    StateViolation::RoomMismatch {
                        actual: endpoint.current_room.clone(),
                        claimed: transfer.from.clone(),
                    },
                ));
            }
            (
                endpoint_state_for(&transfer.to),
                Some(transfer.to.clone()),
                Some(transfer.clone()),
                None,
            )
        }
    };

    Ok(StateChange::Endpoint(EndpointChange {
        endpoint_id,
        previous: endpoint.state,
        current,
        room,
        transfer,
        reason,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::callback::EventType;
    use crate::models::{Endpoint, Participant, Role};
    use chrono::Utc;
    use common::types::{ConferenceId, HearingId};

    const ALL_PARTICIPANT_STATES: [P; 7] = [
        P::NotSignedIn,
        P::UnableToJoin,
        P::Joining,
        P::Available,
        P::InHearing,
        P::InConsultation,
        P::Disconnected,
    ];

    const ALL_CONFERENCE_STATES: [C; 5] =
        [C::NotStarted, C::InSession, C::Paused, C::Suspended, C::Closed];

    fn conference_with(state: P, room: Option<RoomType>) -> (Conference, ParticipantId) {
        let participant = Participant {
            id: ParticipantId::new(),
            username: "individual@test.local".to_string(),
            display_name: "Ind One".to_string(),
            role: Role::Individual,
            state,
            current_room: room,
        };
        let id = participant.id;
        let conference = Conference {
            id: ConferenceId::new(),
            hearing_id: HearingId::new(),
            case_name: "R v Test".to_string(),
            case_number: "T-1".to_string(),
            case_type: "Crime".to_string(),
            hearing_venue_name: "Manchester".to_string(),
            scheduled_at: Utc::now(),
            scheduled_duration_minutes: 45,
            state: C::InSession,
            participants: vec![participant],
            endpoints: vec![Endpoint {
                id: EndpointId::new(),
                display_name: "Courtroom 1".to_string(),
                sip_address: "room1@sip.test".to_string(),
                state: E::NotYetJoined,
                current_room: None,
            }],
            allocated_cso: None,
        };
        (conference, id)
    }

    fn event(conference: &Conference, event_type: EventType, kind: EventKind) -> CallbackEvent {
        CallbackEvent {
            event_id: "evt".to_string(),
            event_type,
            conference_id: conference.id,
            occurred_at: Utc::now(),
            kind,
        }
    }

    fn participant_event(
        conference: &Conference,
        participant_id: ParticipantId,
        action: ParticipantAction,
    ) -> CallbackEvent {
        use crate::events::callback::EventType as T;
        let event_type = match &action {
            ParticipantAction::Joining => T::ParticipantJoining,
            ParticipantAction::Joined => T::Joined,
            ParticipantAction::Disconnected { .. } => T::Disconnected,
            ParticipantAction::Leave => T::Leave,
            ParticipantAction::NotSignedIn => T::ParticipantNotSignedIn,
            ParticipantAction::SelfTestFailed { .. } => T::SelfTestFailed,
            ParticipantAction::Transfer(_) => T::Transfer,
            ParticipantAction::Consultation { .. } => T::Consultation,
            ParticipantAction::Help => T::Help,
            ParticipantAction::VhoCall => T::VhoCall,
        };
        event(
            conference,
            event_type,
            EventKind::Participant {
                participant_id,
                action,
            },
        )
    }

    fn state_of(conference: &Conference, id: ParticipantId) -> P {
        conference.participant(id).unwrap().state
    }

    /// For each simple participant event, every state outside the allowed set
    /// is rejected without mutation and every state inside it lands on `target`.
    #[test]
    fn test_participant_transitions_follow_table() {
        let cases: [(ParticipantAction, &[P], P); 6] = [
            (ParticipantAction::Joining, JOINING_FROM, P::Joining),
            (
                ParticipantAction::SelfTestFailed { reason: None },
                SELF_TEST_FAILED_FROM,
                P::UnableToJoin,
            ),
            (ParticipantAction::Joined, JOINED_FROM, P::Available),
            (
                ParticipantAction::Disconnected { reason: None },
                DISCONNECT_FROM,
                P::Disconnected,
            ),
            (ParticipantAction::Leave, DISCONNECT_FROM, P::Disconnected),
            (ParticipantAction::NotSignedIn, NOT_SIGNED_IN_FROM, P::NotSignedIn),
        ];

        for (action, allowed, target) in cases {
            for state in ALL_PARTICIPANT_STATES {
                let (mut conference, id) = conference_with(state, None);
                let before = conference.clone();
                let evt = participant_event(&conference, id, action.clone());

                let result = apply(&mut conference, &evt);
                if allowed.contains(&state) {
                    let change = result.unwrap();
                    assert!(matches!(change, StateChange::Participant(ref c) if c.previous == state && c.current == target));
                    assert_eq!(state_of(&conference, id), target);
                } else {
                    assert!(
                        matches!(result, Err(GuardError::OrderViolation(_))),
                        "{action:?} from {state} should be rejected"
                    );
                    assert_eq!(conference, before, "rejected event must not mutate");
                }
            }
        }
    }

    #[test]
    fn test_joining_then_joined_lands_in_waiting_room() {
        let (mut conference, id) = conference_with(P::Joining, None);
        let evt = participant_event(&conference, id, ParticipantAction::Joined);

        apply(&mut conference, &evt).unwrap();

        let participant = conference.participant(id).unwrap();
        assert_eq!(participant.state, P::Available);
        assert_eq!(participant.current_room, Some(RoomType::WaitingRoom));
    }

    #[test]
    fn test_second_disconnect_is_order_violation() {
        let (mut conference, id) = conference_with(P::Disconnected, None);
        let evt = participant_event(
            &conference,
            id,
            ParticipantAction::Disconnected {
                reason: Some("network".to_string()),
            },
        );

        let err = apply(&mut conference, &evt).unwrap_err();
        let GuardError::OrderViolation(order) = err else {
            unreachable!("expected order violation, got {err:?}");
        };
        assert_eq!(*order.event, evt);
        assert_eq!(
            order.violation,
            StateViolation::Participant {
                participant_id: id,
                actual: P::Disconnected,
                expected: DISCONNECT_FROM,
            }
        );
        assert_eq!(state_of(&conference, id), P::Disconnected);
    }

    #[test]
    fn test_order_violation_message_names_event_and_state() {
        let (mut conference, id) = conference_with(P::NotSignedIn, None);
        let evt = participant_event(&conference, id, ParticipantAction::Joined);

        let err = apply(&mut conference, &evt).unwrap_err();
        assert!(err.to_string().starts_with("Unexpected Joined event evt"));

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some(format!("participant {id} is NotSignedIn, expected one of [Joining]").as_str())
        );
    }

    #[test]
    fn test_transfer_to_hearing_room() {
        let (mut conference, id) = conference_with(P::Available, Some(RoomType::WaitingRoom));
        let evt = participant_event(
            &conference,
            id,
            ParticipantAction::Transfer(RoomTransfer::new(RoomType::WaitingRoom, RoomType::HearingRoom)),
        );

        let change = apply(&mut conference, &evt).unwrap();
        assert!(matches!(change, StateChange::Participant(ref c) if c.transfer.is_some()));
        let participant = conference.participant(id).unwrap();
        assert_eq!(participant.state, P::InHearing);
        assert_eq!(participant.current_room, Some(RoomType::HearingRoom));
    }

    #[test]
    fn test_consultation_to_hearing_is_invalid_transfer() {
        let consultation = RoomType::consultation("ParticipantConsultationRoom1");
        let (mut conference, id) = conference_with(P::InConsultation, Some(consultation.clone()));
        let before = conference.clone();
        let evt = participant_event(
            &conference,
            id,
            ParticipantAction::Transfer(RoomTransfer::new(consultation.clone(), RoomType::HearingRoom)),
        );

        let err = apply(&mut conference, &evt).unwrap_err();
        assert_eq!(
            err,
            GuardError::InvalidTransfer(RoomTransferError {
                from: consultation,
                to: RoomType::HearingRoom
            })
        );
        assert_eq!(conference, before);
    }

    #[test]
    fn test_transfer_from_wrong_room_is_rejected() {
        let (mut conference, id) = conference_with(P::InHearing, Some(RoomType::HearingRoom));
        let evt = participant_event(
            &conference,
            id,
            ParticipantAction::Transfer(RoomTransfer::new(RoomType::WaitingRoom, RoomType::HearingRoom)),
        );

        let err = apply(&mut conference, &evt).unwrap_err();
        assert!(matches!(
            err,
            GuardError::OrderViolation(UnexpectedEventOrder {
                violation: StateViolation::RoomMismatch { .. },
                ..
            })
        ));
        assert_eq!(state_of(&conference, id), P::InHearing);
    }

    #[test]
    fn test_transfer_requires_connected_participant() {
        let (mut conference, id) = conference_with(P::Joining, Some(RoomType::WaitingRoom));
        let evt = participant_event(
            &conference,
            id,
            ParticipantAction::Transfer(RoomTransfer::new(RoomType::WaitingRoom, RoomType::HearingRoom)),
        );

        assert!(matches!(
            apply(&mut conference, &evt),
            Err(GuardError::OrderViolation(_))
        ));
    }

    #[test]
    fn test_suspended_conference_still_accepts_consultation() {
        let (mut conference, id) = conference_with(P::Available, Some(RoomType::WaitingRoom));
        let suspend = event(
            &conference,
            EventType::Suspend,
            EventKind::Conference(ConferenceAction::Suspend),
        );
        apply(&mut conference, &suspend).unwrap();
        assert_eq!(conference.state, C::Suspended);

        let room = RoomType::consultation("ParticipantConsultationRoom1");
        let consult = participant_event(
            &conference,
            id,
            ParticipantAction::Consultation {
                from: None,
                to: room.clone(),
            },
        );
        apply(&mut conference, &consult).unwrap();

        let participant = conference.participant(id).unwrap();
        assert_eq!(participant.state, P::InConsultation);
        assert_eq!(participant.current_room, Some(room));
    }

    #[test]
    fn test_consultation_from_hearing_is_rejected() {
        let (mut conference, id) = conference_with(P::InHearing, Some(RoomType::HearingRoom));
        let consult = participant_event(
            &conference,
            id,
            ParticipantAction::Consultation {
                from: None,
                to: RoomType::consultation("ParticipantConsultationRoom1"),
            },
        );

        assert!(matches!(
            apply(&mut conference, &consult),
            Err(GuardError::OrderViolation(_))
        ));
    }

    #[test]
    fn test_help_requires_signed_in_participant() {
        let (mut conference, id) = conference_with(P::NotSignedIn, None);
        let help = participant_event(&conference, id, ParticipantAction::Help);
        assert!(apply(&mut conference, &help).is_err());

        let (mut conference, id) = conference_with(P::Available, Some(RoomType::WaitingRoom));
        let before = conference.clone();
        let help = participant_event(&conference, id, ParticipantAction::Help);
        let change = apply(&mut conference, &help).unwrap();
        assert!(matches!(change, StateChange::HelpRequested { ref display_name, .. } if display_name == "Ind One"));
        assert_eq!(conference, before);
    }

    #[test]
    fn test_unknown_participant_is_not_found() {
        let (mut conference, _) = conference_with(P::Joining, None);
        let stranger = ParticipantId::new();
        let evt = participant_event(&conference, stranger, ParticipantAction::Joined);

        assert_eq!(
            apply(&mut conference, &evt).unwrap_err(),
            GuardError::ParticipantNotFound(stranger)
        );
    }

    #[test]
    fn test_conference_transitions_follow_table() {
        let cases: [(ConferenceAction, &[C]); 5] = [
            (ConferenceAction::Start, START_FROM),
            (ConferenceAction::Pause, PAUSE_FROM),
            (ConferenceAction::Suspend, SUSPEND_FROM),
            (ConferenceAction::Close, CLOSE_FROM),
            (ConferenceAction::CountdownFinished, COUNTDOWN_FROM),
        ];

        for (action, allowed) in cases {
            for state in ALL_CONFERENCE_STATES {
                let (mut conference, _) = conference_with(P::NotSignedIn, None);
                conference.state = state;
                let evt = event(
                    &conference,
                    EventType::Start,
                    EventKind::Conference(action),
                );

                let result = apply(&mut conference, &evt);
                assert_eq!(
                    result.is_ok(),
                    allowed.contains(&state),
                    "{action:?} from {state}"
                );
                if result.is_err() {
                    assert_eq!(conference.state, state);
                }
            }
        }
    }

    #[test]
    fn test_endpoint_join_transfer_disconnect() {
        let (mut conference, _) = conference_with(P::NotSignedIn, None);
        let endpoint_id = conference.endpoints.first().unwrap().id;
        let endpoint_event = |conference: &Conference, action: EndpointAction| {
            event(
                conference,
                EventType::EndpointTransfer,
                EventKind::Endpoint {
                    endpoint_id,
                    action,
                },
            )
        };

        let joined = endpoint_event(&conference, EndpointAction::Joined);
        apply(&mut conference, &joined).unwrap();
        assert_eq!(conference.endpoint(endpoint_id).unwrap().state, E::Connected);

        let room = RoomType::consultation("ParticipantConsultationRoom3");
        let transfer = endpoint_event(
            &conference,
            EndpointAction::Transfer(RoomTransfer::new(RoomType::WaitingRoom, room.clone())),
        );
        apply(&mut conference, &transfer).unwrap();
        let endpoint = conference.endpoint(endpoint_id).unwrap();
        assert_eq!(endpoint.state, E::InConsultation);
        assert_eq!(endpoint.current_room, Some(room));

        let disconnected = endpoint_event(&conference, EndpointAction::Disconnected { reason: None });
        apply(&mut conference, &disconnected).unwrap();
        assert_eq!(conference.endpoint(endpoint_id).unwrap().state, E::Disconnected);

        let again = endpoint_event(&conference, EndpointAction::Disconnected { reason: None });
        assert!(matches!(
            apply(&mut conference, &again),
            Err(GuardError::OrderViolation(_))
        ));
    }

    #[test]
    fn test_unknown_endpoint_is_not_found() {
        let (mut conference, _) = conference_with(P::NotSignedIn, None);
        let stranger = EndpointId::new();
        let evt = event(
            &conference,
            EventType::EndpointJoined,
            EventKind::Endpoint {
                endpoint_id: stranger,
                action: EndpointAction::Joined,
            },
        );
        assert_eq!(
            apply(&mut conference, &evt).unwrap_err(),
            GuardError::EndpointNotFound(stranger)
        );
    }
}
