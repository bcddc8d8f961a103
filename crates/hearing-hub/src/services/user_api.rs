//! User API client, used to resolve the profile behind a hub connection.

use super::{classify_status, DownstreamError};
use crate::models::UserProfile;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{instrument, warn};

#[async_trait]
pub trait UserApiClient: Send + Sync {
    async fn get_user_profile(&self, username: &str) -> Result<UserProfile, DownstreamError>;
}

/// reqwest-backed User API client.
#[derive(Clone)]
pub struct HttpUserApiClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpUserApiClient {
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
impl UserApiClient for HttpUserApiClient {
    #[instrument(skip(self))]
    async fn get_user_profile(&self, username: &str) -> Result<UserProfile, DownstreamError> {
        let url = format!("{}/users/{}", self.base_url, username);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "hh.services.user_api", error = %e, "User API request failed");
                DownstreamError::Unavailable("User API is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "user profile"));
        }

        response.json::<UserProfile>().await.map_err(|e| {
            warn!(target: "hh.services.user_api", error = %e, "Failed to decode user profile");
            DownstreamError::InvalidResponse("user profile".to_string())
        })
    }
}

/// In-memory User API for tests.
#[derive(Default)]
pub struct MockUserApiClient {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl MockUserApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert keyed by lowercase username.
    #[must_use]
    pub fn with_profile(self, profile: UserProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn insert(&self, profile: UserProfile) {
        if let Ok(mut map) = self.profiles.lock() {
            map.insert(profile.username.to_ascii_lowercase(), profile);
        }
    }
}

#[async_trait]
impl UserApiClient for MockUserApiClient {
    async fn get_user_profile(&self, username: &str) -> Result<UserProfile, DownstreamError> {
        self.profiles
            .lock()
            .ok()
            .and_then(|map| map.get(&username.to_ascii_lowercase()).cloned())
            .ok_or_else(|| DownstreamError::NotFound(format!("user {username}")))
    }
}
