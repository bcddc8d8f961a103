//! Internal events raised by other platform services.
//!
//! Each [`InternalEvent`] variant has a closed tag, [`InternalEventKind`].
//! The [`InternalEventHandlerRegistry`] maps tags to handlers and is filled
//! once at startup; a kind with no handler resolves to `None`.

pub mod handlers;

pub use handlers::{
    default_registry, AllocationUpdatedHandler, HearingCancelledHandler,
    NewConferenceAddedHandler, ParticipantsUpdatedHandler,
};

use crate::errors::HubError;
use async_trait::async_trait;
use common::types::ConferenceId;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Payloads posted to `/internal-event/{kind}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ParticipantsUpdated(ParticipantsUpdated),
    NewConferenceAdded(NewConferenceAdded),
    AllocationUpdated(AllocationUpdated),
    HearingCancelled(HearingCancelled),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParticipantsUpdated {
    pub conference_id: ConferenceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewConferenceAdded {
    pub conference_id: ConferenceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocationUpdated {
    pub cso_username: String,
    pub conference_ids: Vec<ConferenceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HearingCancelled {
    pub conference_id: ConferenceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalEventKind {
    ParticipantsUpdated,
    NewConferenceAdded,
    AllocationUpdated,
    HearingCancelled,
}

impl InternalEventKind {
    pub const ALL: [InternalEventKind; 4] = [
        InternalEventKind::ParticipantsUpdated,
        InternalEventKind::NewConferenceAdded,
        InternalEventKind::AllocationUpdated,
        InternalEventKind::HearingCancelled,
    ];

    /// Path segment used in `/internal-event/{kind}`.
    pub fn as_str(self) -> &'static str {
        match self {
            InternalEventKind::ParticipantsUpdated => "participants-updated",
            InternalEventKind::NewConferenceAdded => "new-conference-added",
            InternalEventKind::AllocationUpdated => "allocation-updated",
            InternalEventKind::HearingCancelled => "hearing-cancelled",
        }
    }
}

impl fmt::Display for InternalEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InternalEventKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HubError::NotFound(format!("internal event kind '{s}'")))
    }
}

impl InternalEvent {
    pub fn kind(&self) -> InternalEventKind {
        match self {
            InternalEvent::ParticipantsUpdated(_) => InternalEventKind::ParticipantsUpdated,
            InternalEvent::NewConferenceAdded(_) => InternalEventKind::NewConferenceAdded,
            InternalEvent::AllocationUpdated(_) => InternalEventKind::AllocationUpdated,
            InternalEvent::HearingCancelled(_) => InternalEventKind::HearingCancelled,
        }
    }

    /// Decode the JSON body posted for `kind`.
    ///
    /// # Errors
    ///
    /// `HubError::BadRequest` if the body does not match the kind's payload.
    pub fn from_parts(kind: InternalEventKind, body: serde_json::Value) -> Result<Self, HubError> {
        fn decode<T: serde::de::DeserializeOwned>(
            kind: InternalEventKind,
            body: serde_json::Value,
        ) -> Result<T, HubError> {
            serde_json::from_value(body)
                .map_err(|e| HubError::BadRequest(format!("invalid {kind} payload: {e}")))
        }

        Ok(match kind {
            InternalEventKind::ParticipantsUpdated => {
                InternalEvent::ParticipantsUpdated(decode(kind, body)?)
            }
            InternalEventKind::NewConferenceAdded => {
                InternalEvent::NewConferenceAdded(decode(kind, body)?)
            }
            InternalEventKind::AllocationUpdated => {
                InternalEvent::AllocationUpdated(decode(kind, body)?)
            }
            InternalEventKind::HearingCancelled => {
                InternalEvent::HearingCancelled(decode(kind, body)?)
            }
        })
    }
}

#[async_trait]
pub trait InternalEventHandler: Send + Sync {
    async fn handle(&self, event: &InternalEvent) -> Result<(), HubError>;
}

/// Handler lookup by event kind.
#[derive(Clone, Default)]
pub struct InternalEventHandlerRegistry {
    handlers: HashMap<InternalEventKind, Arc<dyn InternalEventHandler>>,
}

impl InternalEventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: InternalEventKind, handler: Arc<dyn InternalEventHandler>) {
        self.handlers.insert(kind, handler);
    }

    #[must_use]
    pub fn with(mut self, kind: InternalEventKind, handler: Arc<dyn InternalEventHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Handler for `event`'s kind, if one was registered.
    pub fn get(&self, event: &InternalEvent) -> Option<Arc<dyn InternalEventHandler>> {
        self.handlers.get(&event.kind()).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
