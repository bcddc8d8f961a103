//! Single-purpose notifier traits used by the internal event handlers.
//!
//! Each takes only the data needed to build its frame. [`HubDispatcher`]
//! implements all of them; tests substitute recording fakes.

use crate::errors::HubError;
use crate::hub::{HubDispatcher, HubGroup, HubMessage};
use crate::models::{AllocatedHearing, Conference};
use async_trait::async_trait;
use common::types::ConferenceId;

#[async_trait]
pub trait ParticipantsUpdatedEventNotifier: Send + Sync {
    /// Push the conference's current participant list to its audience.
    ///
    /// Does nothing unless overridden.
    async fn push_participants_updated(&self, _conference: &Conference) -> Result<(), HubError> {
        Ok(())
    }
}

#[async_trait]
pub trait NewConferenceAddedEventNotifier: Send + Sync {
    async fn push_new_conference_added(&self, conference: &Conference) -> Result<(), HubError>;
}

#[async_trait]
pub trait AllocationHearingsEventNotifier: Send + Sync {
    async fn push_allocation_to_cso(
        &self,
        cso_username: &str,
        hearings: &[AllocatedHearing],
    ) -> Result<(), HubError>;
}

#[async_trait]
pub trait HearingCancelledEventNotifier: Send + Sync {
    /// `venue` is the cancelled hearing's venue when it was still cached.
    /// Without it the cancellation goes to every officer.
    async fn push_hearing_cancelled(
        &self,
        conference_id: ConferenceId,
        venue: Option<&str>,
    ) -> Result<(), HubError>;
}

#[async_trait]
impl ParticipantsUpdatedEventNotifier for HubDispatcher {
    async fn push_participants_updated(&self, conference: &Conference) -> Result<(), HubError> {
        let message = HubMessage::ParticipantsUpdatedMessage {
            conference_id: conference.id,
            participants: conference.participants.clone(),
        };
        self.publish(Self::conference_audience(conference), &message)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl NewConferenceAddedEventNotifier for HubDispatcher {
    async fn push_new_conference_added(&self, conference: &Conference) -> Result<(), HubError> {
        let message = HubMessage::NewConferenceAddedMessage {
            conference_id: conference.id,
            case_name: conference.case_name.clone(),
            hearing_venue_name: conference.hearing_venue_name.clone(),
            scheduled_at: conference.scheduled_at,
        };
        let groups = vec![
            HubGroup::Officers,
            HubGroup::venue(&conference.hearing_venue_name),
        ];
        self.publish(groups, &message).await.map(|_| ())
    }
}

#[async_trait]
impl AllocationHearingsEventNotifier for HubDispatcher {
    async fn push_allocation_to_cso(
        &self,
        cso_username: &str,
        hearings: &[AllocatedHearing],
    ) -> Result<(), HubError> {
        let message = HubMessage::AllocationsUpdated {
            cso_username: cso_username.to_string(),
            hearings: hearings.to_vec(),
        };
        self.publish(vec![HubGroup::user(cso_username)], &message)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl HearingCancelledEventNotifier for HubDispatcher {
    async fn push_hearing_cancelled(
        &self,
        conference_id: ConferenceId,
        venue: Option<&str>,
    ) -> Result<(), HubError> {
        let groups = vec![
            HubGroup::Conference(conference_id),
            venue.map_or(HubGroup::Officers, HubGroup::venue),
        ];
        self.publish(groups, &HubMessage::HearingCancelledMessage { conference_id })
            .await
            .map(|_| ())
    }
}
