//! Video API client.
//!
//! The Video API owns conference state; the hub reads a conference when it is
//! first referenced and whenever it is told the participant list changed.

use super::{classify_status, DownstreamError};
use crate::models::{
    Conference, ConferenceState, Endpoint, EndpointState, Participant, ParticipantState, Role,
    RoomType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{ConferenceId, EndpointId, HearingId, ParticipantId};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{instrument, warn};

#[async_trait]
pub trait VideoApiClient: Send + Sync {
    /// Fetch the full details of a conference.
    async fn get_conference_details(
        &self,
        conference_id: ConferenceId,
    ) -> Result<Conference, DownstreamError>;
}

#[derive(Debug, Deserialize)]
pub struct ParticipantDetailsResponse {
    pub id: ParticipantId,
    pub username: String,
    pub display_name: String,
    pub user_role: Role,
    pub current_status: ParticipantState,
    #[serde(default)]
    pub current_room: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointDetailsResponse {
    pub id: EndpointId,
    pub display_name: String,
    pub sip_address: String,
    pub status: EndpointState,
    #[serde(default)]
    pub current_room: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConferenceDetailsResponse {
    pub id: ConferenceId,
    pub hearing_id: HearingId,
    pub case_name: String,
    pub case_number: String,
    pub case_type: String,
    pub hearing_venue_name: String,
    pub scheduled_date_time: DateTime<Utc>,
    pub scheduled_duration: u32,
    pub current_status: ConferenceState,
    #[serde(default)]
    pub participants: Vec<ParticipantDetailsResponse>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDetailsResponse>,
    #[serde(default)]
    pub allocated_cso: Option<String>,
}

fn parse_room(raw: Option<String>) -> Result<Option<RoomType>, DownstreamError> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| {
            r.parse::<RoomType>()
                .map_err(|e| DownstreamError::InvalidResponse(e.to_string()))
        })
        .transpose()
}

impl TryFrom<ConferenceDetailsResponse> for Conference {
    type Error = DownstreamError;

    fn try_from(response: ConferenceDetailsResponse) -> Result<Self, Self::Error> {
        let participants = response
            .participants
            .into_iter()
            .map(|p| {
                Ok(Participant {
                    id: p.id,
                    username: p.username,
                    display_name: p.display_name,
                    role: p.user_role,
                    state: p.current_status,
                    current_room: parse_room(p.current_room)?,
                })
            })
            .collect::<Result<Vec<_>, DownstreamError>>()?;

        let endpoints = response
            .endpoints
            .into_iter()
            .map(|e| {
                Ok(Endpoint {
                    id: e.id,
                    display_name: e.display_name,
                    sip_address: e.sip_address,
                    state: e.status,
                    current_room: parse_room(e.current_room)?,
                })
            })
            .collect::<Result<Vec<_>, DownstreamError>>()?;

        Ok(Conference {
            id: response.id,
            hearing_id: response.hearing_id,
            case_name: response.case_name,
            case_number: response.case_number,
            case_type: response.case_type,
            hearing_venue_name: response.hearing_venue_name,
            scheduled_at: response.scheduled_date_time,
            scheduled_duration_minutes: response.scheduled_duration,
            state: response.current_status,
            participants,
            endpoints,
            allocated_cso: response.allocated_cso,
        })
    }
}

/// reqwest-backed Video API client.
#[derive(Clone)]
pub struct HttpVideoApiClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpVideoApiClient {
    /// Build a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamError::Unavailable` if the HTTP client cannot be built.
    pub fn new(base_url: String, token: SecretString, timeout: Duration) -> Result<Self, DownstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DownstreamError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl VideoApiClient for HttpVideoApiClient {
    #[instrument(skip(self), fields(conference_id = %conference_id))]
    async fn get_conference_details(
        &self,
        conference_id: ConferenceId,
    ) -> Result<Conference, DownstreamError> {
        let url = format!("{}/conferences/{}", self.base_url, conference_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "hh.services.video_api", error = %e, "Video API request failed");
                DownstreamError::Unavailable("Video API is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "hh.services.video_api",
                status = %status,
                "Video API returned non-success status"
            );
            return Err(classify_status(status, &format!("conference {conference_id}")));
        }

        let details: ConferenceDetailsResponse = response.json().await.map_err(|e| {
            warn!(target: "hh.services.video_api", error = %e, "Failed to decode conference details");
            DownstreamError::InvalidResponse("conference details".to_string())
        })?;

        Conference::try_from(details)
    }
}

/// In-memory Video API for tests.
///
/// Counts calls and can be switched into a failing mode or
/// made slow to exercise concurrent cache loads.
#[derive(Default)]
pub struct MockVideoApiClient {
    conferences: Mutex<HashMap<ConferenceId, Conference>>,
    failure: Mutex<Option<DownstreamError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockVideoApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that already knows `conferences`.
    pub fn with_conferences(conferences: impl IntoIterator<Item = Conference>) -> Arc<Self> {
        let mock = Self::new();
        for conference in conferences {
            mock.insert(conference);
        }
        Arc::new(mock)
    }

    /// Add or replace a conference.
    pub fn insert(&self, conference: Conference) {
        if let Ok(mut map) = self.conferences.lock() {
            map.insert(conference.id, conference);
        }
    }

    pub fn remove(&self, conference_id: ConferenceId) {
        if let Ok(mut map) = self.conferences.lock() {
            map.remove(&conference_id);
        }
    }

    /// Make every subsequent call fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<DownstreamError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.lock() {
            *d = delay;
        }
    }

    /// Number of `get_conference_details` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoApiClient for MockVideoApiClient {
    async fn get_conference_details(
        &self,
        conference_id: ConferenceId,
    ) -> Result<Conference, DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(error);
        }

        self.conferences
            .lock()
            .ok()
            .and_then(|map| map.get(&conference_id).cloned())
            .ok_or_else(|| DownstreamError::NotFound(format!("conference {conference_id}")))
    }
}
