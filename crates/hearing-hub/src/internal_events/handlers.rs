//! Built-in internal event handlers.

use super::{
    InternalEvent, InternalEventHandler, InternalEventHandlerRegistry, InternalEventKind,
};
use crate::cache::ConferenceCache;
use crate::errors::HubError;
use crate::hub::HubDispatcher;
use crate::models::AllocatedHearing;
use crate::notifiers::{
    AllocationHearingsEventNotifier, HearingCancelledEventNotifier,
    NewConferenceAddedEventNotifier, ParticipantsUpdatedEventNotifier,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

fn unexpected(expected: InternalEventKind, event: &InternalEvent) -> HubError {
    HubError::Internal(format!(
        "{expected} handler received {} event",
        event.kind()
    ))
}

/// Reloads a conference whose participants changed and pushes the new list.
pub struct ParticipantsUpdatedHandler {
    cache: Arc<ConferenceCache>,
    notifier: Option<Arc<dyn ParticipantsUpdatedEventNotifier>>,
}

impl ParticipantsUpdatedHandler {
    /// Without a notifier the reload still happens and nothing is pushed.
    pub fn new(
        cache: Arc<ConferenceCache>,
        notifier: Option<Arc<dyn ParticipantsUpdatedEventNotifier>>,
    ) -> Self {
        Self { cache, notifier }
    }
}

#[async_trait]
impl InternalEventHandler for ParticipantsUpdatedHandler {
    #[instrument(skip_all, name = "hh.internal.participants_updated")]
    async fn handle(&self, event: &InternalEvent) -> Result<(), HubError> {
        let InternalEvent::ParticipantsUpdated(payload) = event else {
            return Err(unexpected(InternalEventKind::ParticipantsUpdated, event));
        };

        let conference = self
            .cache
            .refresh(payload.conference_id)
            .await?
            .ok_or(HubError::ConferenceNotFound(payload.conference_id))?;

        if let Some(notifier) = &self.notifier {
            notifier.push_participants_updated(&conference).await?;
        }
        Ok(())
    }
}

/// Loads a newly booked conference and announces it to officers.
pub struct NewConferenceAddedHandler {
    cache: Arc<ConferenceCache>,
    notifier: Arc<dyn NewConferenceAddedEventNotifier>,
}

impl NewConferenceAddedHandler {
    pub fn new(
        cache: Arc<ConferenceCache>,
        notifier: Arc<dyn NewConferenceAddedEventNotifier>,
    ) -> Self {
        Self { cache, notifier }
    }
}

#[async_trait]
impl InternalEventHandler for NewConferenceAddedHandler {
    #[instrument(skip_all, name = "hh.internal.new_conference_added")]
    async fn handle(&self, event: &InternalEvent) -> Result<(), HubError> {
        let InternalEvent::NewConferenceAdded(payload) = event else {
            return Err(unexpected(InternalEventKind::NewConferenceAdded, event));
        };

        let conference = self.cache.get_or_add(payload.conference_id).await?;
        self.notifier.push_new_conference_added(&conference).await
    }
}

/// Records a CSO allocation on each conference and tells that CSO.
pub struct AllocationUpdatedHandler {
    cache: Arc<ConferenceCache>,
    notifier: Arc<dyn AllocationHearingsEventNotifier>,
}

impl AllocationUpdatedHandler {
    pub fn new(
        cache: Arc<ConferenceCache>,
        notifier: Arc<dyn AllocationHearingsEventNotifier>,
    ) -> Self {
        Self { cache, notifier }
    }
}

#[async_trait]
impl InternalEventHandler for AllocationUpdatedHandler {
    #[instrument(skip_all, name = "hh.internal.allocation_updated")]
    async fn handle(&self, event: &InternalEvent) -> Result<(), HubError> {
        let InternalEvent::AllocationUpdated(payload) = event else {
            return Err(unexpected(InternalEventKind::AllocationUpdated, event));
        };

        let mut hearings = Vec::with_capacity(payload.conference_ids.len());
        for conference_id in &payload.conference_ids {
            let mut lease = match self.cache.lock(*conference_id).await {
                Ok(lease) => lease,
                Err(HubError::ConferenceNotFound(id)) => {
                    warn!(
                        target: "hh.internal",
                        conference_id = %id,
                        "Allocated conference not found, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            lease.conference_mut().allocated_cso = Some(payload.cso_username.clone());
            let conference = lease.commit().await;
            hearings.push(AllocatedHearing::from(&conference));
        }

        info!(
            target: "hh.internal",
            cso = %payload.cso_username,
            hearings = hearings.len(),
            "Allocations updated"
        );
        self.notifier
            .push_allocation_to_cso(&payload.cso_username, &hearings)
            .await
    }
}

/// Tells a cancelled hearing's audience and forgets the conference.
pub struct HearingCancelledHandler {
    cache: Arc<ConferenceCache>,
    notifier: Arc<dyn HearingCancelledEventNotifier>,
}

impl HearingCancelledHandler {
    pub fn new(cache: Arc<ConferenceCache>, notifier: Arc<dyn HearingCancelledEventNotifier>) -> Self {
        Self { cache, notifier }
    }
}

#[async_trait]
impl InternalEventHandler for HearingCancelledHandler {
    #[instrument(skip_all, name = "hh.internal.hearing_cancelled")]
    async fn handle(&self, event: &InternalEvent) -> Result<(), HubError> {
        let InternalEvent::HearingCancelled(payload) = event else {
            return Err(unexpected(InternalEventKind::HearingCancelled, event));
        };

        let venue = self
            .cache
            .get_conference(payload.conference_id)
            .await
            .map(|c| c.hearing_venue_name);

        self.notifier
            .push_hearing_cancelled(payload.conference_id, venue.as_deref())
            .await?;

        if self.cache.remove(payload.conference_id).await {
            debug!(
                target: "hh.internal",
                conference_id = %payload.conference_id,
                "Cancelled conference evicted"
            );
        }
        Ok(())
    }
}

/// Registry with every built-in handler, notifying through `dispatcher`.
pub fn default_registry(
    cache: &Arc<ConferenceCache>,
    dispatcher: &HubDispatcher,
) -> InternalEventHandlerRegistry {
    let dispatcher = Arc::new(dispatcher.clone());

    InternalEventHandlerRegistry::new()
        .with(
            InternalEventKind::ParticipantsUpdated,
            Arc::new(ParticipantsUpdatedHandler::new(
                Arc::clone(cache),
                Some(Arc::clone(&dispatcher) as Arc<dyn ParticipantsUpdatedEventNotifier>),
            )),
        )
        .with(
            InternalEventKind::NewConferenceAdded,
            Arc::new(NewConferenceAddedHandler::new(
                Arc::clone(cache),
                Arc::clone(&dispatcher) as Arc<dyn NewConferenceAddedEventNotifier>,
            )),
        )
        .with(
            InternalEventKind::AllocationUpdated,
            Arc::new(AllocationUpdatedHandler::new(
                Arc::clone(cache),
                Arc::clone(&dispatcher) as Arc<dyn AllocationHearingsEventNotifier>,
            )),
        )
        .with(
            InternalEventKind::HearingCancelled,
            Arc::new(HearingCancelledHandler::new(
                Arc::clone(cache),
                dispatcher as Arc<dyn HearingCancelledEventNotifier>,
            )),
        )
}
