//! Runs one callback through the pipeline.
//!
//! The conference lease is held from guard evaluation until the change has
//! been handed to the hub, so events for the same conference are applied and
//! published one at a time and in arrival order.

use super::callback::{classify, CallbackEventRequest, ConferenceAction, EventKind};
use super::guard::{self, GuardError};
use crate::cache::ConferenceCache;
use crate::errors::HubError;
use crate::hub::HubDispatcher;
use crate::observability::metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What happened to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Accepted, committed and dispatched.
    Applied,
    /// Rejected by the ordering guard; the cache is unchanged.
    Dropped,
    /// Event type the hub does not handle.
    Ignored,
}

impl CallbackOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackOutcome::Applied => "applied",
            CallbackOutcome::Dropped => "dropped",
            CallbackOutcome::Ignored => "ignored",
        }
    }
}

fn rejection_reason(error: &GuardError) -> &'static str {
    match error {
        GuardError::OrderViolation(_) => "order_violation",
        GuardError::InvalidTransfer(_) => "invalid_transfer",
        GuardError::ParticipantNotFound(_) | GuardError::EndpointNotFound(_) => "not_found",
    }
}

pub struct EventProcessor {
    cache: Arc<ConferenceCache>,
    dispatcher: HubDispatcher,
}

impl EventProcessor {
    pub fn new(cache: Arc<ConferenceCache>, dispatcher: HubDispatcher) -> Self {
        Self { cache, dispatcher }
    }

    /// Classify, validate, commit and dispatch one callback.
    ///
    /// # Errors
    ///
    /// - `HubError::BadRequest` for a known event type missing its data
    /// - `HubError::NotFound` / `ConferenceNotFound` for unknown ids
    /// - `HubError::Downstream` / `ConferenceBusy` from the cache
    #[instrument(
        skip_all,
        name = "hh.events.process",
        fields(event_id = %request.event_id, event_type = %request.event_type)
    )]
    pub async fn process(&self, request: &CallbackEventRequest) -> Result<CallbackOutcome, HubError> {
        let Some(event) = classify(request).map_err(|e| HubError::BadRequest(e.to_string()))? else {
            warn!(
                target: "hh.events",
                event_type = %request.event_type,
                conference_id = %request.conference_id,
                "Ignoring unsupported callback event type"
            );
            return Ok(CallbackOutcome::Ignored);
        };

        let mut lease = self.cache.lock(event.conference_id).await?;

        let change = match guard::apply(lease.conference_mut(), &event) {
            Ok(change) => change,
            Err(GuardError::ParticipantNotFound(id)) => {
                metrics::record_guard_rejection("not_found");
                return Err(HubError::NotFound(format!("participant {id}")));
            }
            Err(GuardError::EndpointNotFound(id)) => {
                metrics::record_guard_rejection("not_found");
                return Err(HubError::NotFound(format!("endpoint {id}")));
            }
            Err(e) => {
                // Lease dropped uncommitted
                warn!(
                    target: "hh.events.guard",
                    error = %e,
                    event = ?event,
                    "Rejected callback event"
                );
                metrics::record_guard_rejection(rejection_reason(&e));
                return Ok(CallbackOutcome::Dropped);
            }
        };

        let conference = lease.save().await;

        // Delivery is best effort; the state change already stands
        if let Err(e) = self.dispatcher.publish_state_change(&conference, &change).await {
            warn!(target: "hh.events", error = %e, "Failed to dispatch state change");
        }

        if matches!(event.kind, EventKind::Conference(ConferenceAction::Close)) {
            self.cache.remove(conference.id).await;
            debug!(target: "hh.events", conference_id = %conference.id, "Closed conference evicted");
        }
        drop(lease);

        Ok(CallbackOutcome::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hub::{ConnectionHandle, HubActorHandle, HubGroup};
    use crate::models::{
        Conference, ConferenceState, Participant, ParticipantState, Role, RoomType,
    };
    use crate::services::{MockVideoApiClient, VideoApiClient};
    use chrono::Utc;
    use common::types::{ConferenceId, HearingId, ParticipantId};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        processor: EventProcessor,
        cache: Arc<ConferenceCache>,
        hub: HubActorHandle,
        conference: Conference,
        participant_id: ParticipantId,
    }

    fn fixture(state: ParticipantState, conference_state: ConferenceState) -> Fixture {
        let participant_id = ParticipantId::new();
        let conference = Conference {
            id: ConferenceId::new(),
            hearing_id: HearingId::new(),
            case_name: "Processor v Test".to_string(),
            case_number: "P-1".to_string(),
            case_type: "Civil".to_string(),
            hearing_venue_name: "Leeds".to_string(),
            scheduled_at: Utc::now(),
            scheduled_duration_minutes: 30,
            state: conference_state,
            participants: vec![Participant {
                id: participant_id,
                username: "rep@court.test".to_string(),
                display_name: "Rep".to_string(),
                role: Role::Representative,
                state,
                current_room: match state {
                    ParticipantState::Available => Some(RoomType::WaitingRoom),
                    _ => None,
                },
            }],
            endpoints: Vec::new(),
            allocated_cso: None,
        };
        let mock = MockVideoApiClient::with_conferences([conference.clone()]);
        let cache = Arc::new(ConferenceCache::new(
            mock as Arc<dyn VideoApiClient>,
            Duration::from_secs(60),
            Duration::from_secs(2),
        ));
        let hub = HubActorHandle::new(CancellationToken::new());
        let processor = EventProcessor::new(Arc::clone(&cache), HubDispatcher::new(hub.clone()));

        Fixture {
            processor,
            cache,
            hub,
            conference,
            participant_id,
        }
    }

    fn request(
        conference_id: ConferenceId,
        event_type: &str,
        participant_id: Option<ParticipantId>,
    ) -> CallbackEventRequest {
        CallbackEventRequest {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            time_stamp_utc: Utc::now(),
            conference_id,
            participant_id,
            endpoint_id: None,
            transfer_from: None,
            transfer_to: None,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_joined_applies_and_pushes_to_subscribers() {
        let f = fixture(ParticipantState::Joining, ConferenceState::NotStarted);
        let (conn, mut rx) = ConnectionHandle::channel("judge@court.test", false, 8);
        let conn_id = conn.id;
        f.hub.register(conn).await.unwrap();
        f.hub
            .join(conn_id, HubGroup::Conference(f.conference.id))
            .await
            .unwrap();

        let outcome = f
            .processor
            .process(&request(f.conference.id, "Joined", Some(f.participant_id)))
            .await
            .unwrap();

        assert_eq!(outcome, CallbackOutcome::Applied);
        let cached = f.cache.get_conference(f.conference.id).await.unwrap();
        let participant = cached.participant(f.participant_id).unwrap();
        assert_eq!(participant.state, ParticipantState::Available);

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"], "ParticipantStatusMessage");
        assert_eq!(frame["data"]["state"], "Available");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_push_in_commit_order() {
        let f = fixture(ParticipantState::Joining, ConferenceState::InSession);
        let (conn, mut rx) = ConnectionHandle::channel("judge@court.test", false, 256);
        let conn_id = conn.id;
        f.hub.register(conn).await.unwrap();
        f.hub
            .join(conn_id, HubGroup::Conference(f.conference.id))
            .await
            .unwrap();

        let processor = Arc::new(f.processor);
        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let processor = Arc::clone(&processor);
                let req = request(
                    f.conference.id,
                    if i % 2 == 0 { "Joined" } else { "Disconnected" },
                    Some(f.participant_id),
                );
                tokio::spawn(async move { processor.process(&req).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut last_pushed = None;
        while let Ok(frame) = rx.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if frame["event"] == "ParticipantStatusMessage" {
                last_pushed = Some(frame["data"]["state"].clone());
            }
        }

        let cached = f.cache.get_conference(f.conference.id).await.unwrap();
        let state = cached.participant(f.participant_id).unwrap().state;
        assert_eq!(last_pushed, Some(serde_json::to_value(state).unwrap()));
    }

    #[tokio::test]
    async fn test_second_disconnect_is_dropped_and_state_kept() {
        let f = fixture(ParticipantState::Available, ConferenceState::InSession);
        let disconnect = request(f.conference.id, "Disconnected", Some(f.participant_id));

        assert_eq!(
            f.processor.process(&disconnect).await.unwrap(),
            CallbackOutcome::Applied
        );
        let after_first = f.cache.get_conference(f.conference.id).await.unwrap();

        assert_eq!(
            f.processor.process(&disconnect).await.unwrap(),
            CallbackOutcome::Dropped
        );
        let after_second = f.cache.get_conference(f.conference.id).await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(
            after_second.participant(f.participant_id).unwrap().state,
            ParticipantState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_consultation_still_applies_while_suspended() {
        let f = fixture(ParticipantState::Available, ConferenceState::InSession);

        let suspend = request(f.conference.id, "Suspend", None);
        assert_eq!(
            f.processor.process(&suspend).await.unwrap(),
            CallbackOutcome::Applied
        );

        let mut consult = request(f.conference.id, "Consultation", Some(f.participant_id));
        consult.transfer_to = Some("ParticipantConsultationRoom1".to_string());
        assert_eq!(
            f.processor.process(&consult).await.unwrap(),
            CallbackOutcome::Applied
        );

        let cached = f.cache.get_conference(f.conference.id).await.unwrap();
        assert_eq!(cached.state, ConferenceState::Suspended);
        assert_eq!(
            cached.participant(f.participant_id).unwrap().state,
            ParticipantState::InConsultation
        );
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_ignored_without_loading() {
        let f = fixture(ParticipantState::Available, ConferenceState::InSession);

        let outcome = f
            .processor
            .process(&request(f.conference.id, "MediaPermissionDenied", None))
            .await
            .unwrap();

        assert_eq!(outcome, CallbackOutcome::Ignored);
        assert!(f.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_participant_id_is_bad_request() {
        let f = fixture(ParticipantState::Joining, ConferenceState::NotStarted);

        let result = f
            .processor
            .process(&request(f.conference.id, "Joined", None))
            .await;

        assert!(matches!(result, Err(HubError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_participant_is_not_found() {
        let f = fixture(ParticipantState::Joining, ConferenceState::NotStarted);

        let result = f
            .processor
            .process(&request(f.conference.id, "Joined", Some(ParticipantId::new())))
            .await;

        assert!(matches!(result, Err(HubError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_conference_is_conference_not_found() {
        let f = fixture(ParticipantState::Joining, ConferenceState::NotStarted);

        let result = f
            .processor
            .process(&request(ConferenceId::new(), "Start", None))
            .await;

        assert!(matches!(result, Err(HubError::ConferenceNotFound(_))));
    }

    #[tokio::test]
    async fn test_close_evicts_conference() {
        let f = fixture(ParticipantState::Available, ConferenceState::InSession);

        let outcome = f
            .processor
            .process(&request(f.conference.id, "Close", None))
            .await
            .unwrap();

        assert_eq!(outcome, CallbackOutcome::Applied);
        assert!(f.cache.get_conference(f.conference.id).await.is_none());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(CallbackOutcome::Dropped).unwrap(),
            serde_json::json!("dropped")
        );
        assert_eq!(CallbackOutcome::Ignored.as_str(), "ignored");
    }
}
