//! Conference cache.
//!
//! In-memory read model of active conferences keyed by id, lazily populated
//! from the Video API. Each conference has its own slot holding:
//!
//! - the cached value and its sliding expiry, behind a short-lived `RwLock`
//! - a gate (`Mutex<()>`) held for the whole of a load or a mutation
//!
//! Holding the gate while loading collapses concurrent first access into a
//! single downstream fetch. Holding it for the life of a [`ConferenceLease`]
//! serializes state mutations per conference. Independent conferences never
//! contend with each other.
//!
//! A slot is only dropped from the map while its gate is held. Callers that
//! were queued on a dropped slot's gate notice the slot is no longer current
//! and start again on its replacement, so nothing is written to a slot the
//! map has forgotten.

use crate::errors::HubError;
use crate::models::Conference;
use crate::observability::metrics;
use crate::services::{DownstreamError, VideoApiClient};
use common::types::ConferenceId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

struct CachedConference {
    conference: Conference,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheSlot {
    entry: RwLock<Option<CachedConference>>,
    gate: Arc<Mutex<()>>,
}

impl CacheSlot {
    /// Current value if present and not expired, extending its expiry.
    async fn read_fresh(&self, ttl: Duration) -> Option<Conference> {
        let mut entry = self.entry.write().await;
        let now = Instant::now();
        match entry.as_mut() {
            Some(cached) if cached.expires_at > now => {
                cached.expires_at = now + ttl;
                Some(cached.conference.clone())
            }
            Some(_) => {
                *entry = None;
                None
            }
            None => None,
        }
    }

    async fn store(&self, conference: Conference, ttl: Duration) {
        *self.entry.write().await = Some(CachedConference {
            conference,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Current value if not expired. Expiry is left alone.
    async fn peek(&self) -> Option<Conference> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.conference.clone())
    }

    async fn is_stale(&self) -> bool {
        match self.entry.read().await.as_ref() {
            Some(cached) => cached.expires_at <= Instant::now(),
            None => true,
        }
    }
}

/// Process-scoped conference cache, shared through `Arc`.
pub struct ConferenceCache {
    slots: RwLock<HashMap<ConferenceId, Arc<CacheSlot>>>,
    loader: Arc<dyn VideoApiClient>,
    ttl: Duration,
    lock_timeout: Duration,
}

impl ConferenceCache {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `loader` - Video API used to populate misses
    /// * `ttl` - Sliding expiry applied on every read and commit
    /// * `lock_timeout` - Maximum wait for a conference's gate
    pub fn new(loader: Arc<dyn VideoApiClient>, ttl: Duration, lock_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            loader,
            ttl,
            lock_timeout,
        }
    }

    async fn existing_slot(&self, id: ConferenceId) -> Option<Arc<CacheSlot>> {
        self.slots.read().await.get(&id).cloned()
    }

    async fn slot(&self, id: ConferenceId) -> Arc<CacheSlot> {
        if let Some(slot) = self.existing_slot(id).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        let slot = Arc::clone(slots.entry(id).or_default());
        metrics::set_cached_conferences(slots.len());
        slot
    }

    async fn is_current(&self, id: ConferenceId, slot: &Arc<CacheSlot>) -> bool {
        self.slots
            .read()
            .await
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Current slot for `id` with its gate held.
    ///
    /// The whole wait, retries included, is bounded by the lock timeout.
    async fn acquire(
        &self,
        id: ConferenceId,
    ) -> Result<(Arc<CacheSlot>, OwnedMutexGuard<()>), HubError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            let slot = self.slot(id).await;
            let gate = tokio::time::timeout_at(deadline, Arc::clone(&slot.gate).lock_owned())
                .await
                .map_err(|_| HubError::ConferenceBusy(id))?;

            if self.is_current(id, &slot).await {
                return Ok((slot, gate));
            }
            debug!(target: "hh.cache", conference_id = %id, "Slot dropped while waiting, retrying");
        }
    }

    /// Drop `slot` if it is still the one mapped to `id`. Caller holds its gate.
    async fn remove_slot(&self, id: ConferenceId, slot: &Arc<CacheSlot>) -> bool {
        let mut slots = self.slots.write().await;
        let removed = slots.get(&id).is_some_and(|current| Arc::ptr_eq(current, slot));
        if removed {
            slots.remove(&id);
        }
        metrics::set_cached_conferences(slots.len());
        removed
    }

    async fn load(&self, id: ConferenceId) -> Result<Conference, HubError> {
        let start = std::time::Instant::now();
        let result = self.loader.get_conference_details(id).await;
        let elapsed = start.elapsed();

        match result {
            Ok(conference) => {
                metrics::record_cache_load("loaded", elapsed);
                debug!(target: "hh.cache", conference_id = %id, "Loaded conference from Video API");
                Ok(conference)
            }
            Err(DownstreamError::NotFound(_)) => {
                metrics::record_cache_load("not_found", elapsed);
                Err(HubError::ConferenceNotFound(id))
            }
            Err(e) => {
                metrics::record_cache_load("error", elapsed);
                warn!(target: "hh.cache", conference_id = %id, error = %e, "Conference load failed");
                Err(HubError::Downstream(e))
            }
        }
    }

    /// Load into `slot` unless another caller already did. Caller holds the gate.
    async fn fill(&self, id: ConferenceId, slot: &CacheSlot) -> Result<Conference, HubError> {
        if let Some(conference) = slot.read_fresh(self.ttl).await {
            return Ok(conference);
        }
        let conference = self.load(id).await?;
        slot.store(conference.clone(), self.ttl).await;
        Ok(conference)
    }

    /// Cached conference, or `None` on a miss or expired entry.
    pub async fn get_conference(&self, id: ConferenceId) -> Option<Conference> {
        let slot = self.existing_slot(id).await?;
        let found = slot.read_fresh(self.ttl).await;
        metrics::record_cache_lookup(found.is_some());
        found
    }

    /// Cached conference, loading it from the Video API on a miss.
    ///
    /// Concurrent callers for the same unseen id share one load.
    ///
    /// # Errors
    ///
    /// - `HubError::ConferenceNotFound` if the Video API does not know the id
    /// - `HubError::Downstream` if the Video API call failed
    /// - `HubError::ConferenceBusy` if the conference stayed locked past the timeout
    #[instrument(skip(self), fields(conference_id = %id))]
    pub async fn get_or_add(&self, id: ConferenceId) -> Result<Conference, HubError> {
        if let Some(conference) = self.get_conference(id).await {
            return Ok(conference);
        }

        let (slot, _gate) = self.acquire(id).await?;
        self.fill(id, &slot).await
    }

    /// Replace the cached value.
    ///
    /// # Errors
    ///
    /// `HubError::ConferenceBusy` if a mutation held the conference past the timeout.
    pub async fn update(&self, conference: Conference) -> Result<(), HubError> {
        let (slot, _gate) = self.acquire(conference.id).await?;
        slot.store(conference, self.ttl).await;
        Ok(())
    }

    /// Take exclusive hold of a conference for a read-modify-write.
    ///
    /// Loads the conference first if it is not cached.
    ///
    /// # Errors
    ///
    /// Same as [`ConferenceCache::get_or_add`].
    #[instrument(skip(self), fields(conference_id = %id))]
    pub async fn lock(&self, id: ConferenceId) -> Result<ConferenceLease, HubError> {
        let (slot, gate) = self.acquire(id).await?;
        let working = self.fill(id, &slot).await?;

        Ok(ConferenceLease {
            slot,
            _gate: gate,
            working,
            ttl: self.ttl,
        })
    }

    /// Reload a conference from the Video API.
    ///
    /// Returns `Ok(None)` and drops the entry if the Video API no longer knows it.
    ///
    /// # Errors
    ///
    /// `HubError::Downstream` or `HubError::ConferenceBusy`; the cached value is kept.
    pub async fn refresh(&self, id: ConferenceId) -> Result<Option<Conference>, HubError> {
        let (slot, _gate) = self.acquire(id).await?;

        match self.load(id).await {
            Ok(conference) => {
                slot.store(conference.clone(), self.ttl).await;
                Ok(Some(conference))
            }
            Err(HubError::ConferenceNotFound(_)) => {
                self.remove_slot(id, &slot).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a conference from the cache.
    pub async fn remove(&self, id: ConferenceId) -> bool {
        let mut slots = self.slots.write().await;
        let removed = slots.remove(&id).is_some();
        metrics::set_cached_conferences(slots.len());
        removed
    }

    /// Drop every expired or empty slot. Returns how many were dropped.
    ///
    /// Slots whose gate is held are skipped; they are mid-load or mid-mutation.
    pub async fn evict_expired(&self) -> usize {
        let snapshot: Vec<(ConferenceId, Arc<CacheSlot>)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        // Gates stay held until the slots are out of the map
        let mut stale = Vec::new();
        for (id, slot) in snapshot {
            let Ok(gate) = Arc::clone(&slot.gate).try_lock_owned() else {
                continue;
            };
            if slot.is_stale().await {
                stale.push((id, slot, gate));
            }
        }

        let mut slots = self.slots.write().await;
        let mut evicted = 0;
        for (id, slot, _gate) in &stale {
            if slots.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                slots.remove(id);
                evicted += 1;
            }
        }
        metrics::set_cached_conferences(slots.len());
        evicted
    }

    /// Ids currently held, fresh or not.
    /// Cached conferences that list `username` as a participant.
    ///
    /// Expired entries are skipped and no expiry is extended.
    pub async fn conferences_with_participant(&self, username: &str) -> Vec<ConferenceId> {
        let snapshot: Vec<_> = self.slots.read().await.values().cloned().collect();

        let mut found = Vec::new();
        for slot in snapshot {
            if let Some(conference) = slot.peek().await {
                if conference.has_participant_username(username) {
                    found.push(conference.id);
                }
            }
        }
        found
    }

    pub async fn conference_ids(&self) -> Vec<ConferenceId> {
        self.slots.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

/// Exclusive hold on one conference.
///
/// Mutate [`ConferenceLease::conference_mut`] and call
/// [`ConferenceLease::commit`] to publish; dropping the lease discards the
/// working copy and leaves the cached value untouched.
pub struct ConferenceLease {
    slot: Arc<CacheSlot>,
    _gate: OwnedMutexGuard<()>,
    working: Conference,
    ttl: Duration,
}

impl ConferenceLease {
    pub fn conference(&self) -> &Conference {
        &self.working
    }

    pub fn conference_mut(&mut self) -> &mut Conference {
        &mut self.working
    }

    /// Write the working copy back and keep holding the conference.
    pub async fn save(&self) -> Conference {
        self.slot.store(self.working.clone(), self.ttl).await;
        self.working.clone()
    }

    /// Write the working copy back and release the conference.
    pub async fn commit(self) -> Conference {
        self.save().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ConferenceState;
    use crate::services::MockVideoApiClient;
    use chrono::Utc;
    use common::types::HearingId;

    const TTL: Duration = Duration::from_secs(60);
    const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

    fn conference() -> Conference {
        Conference {
            id: ConferenceId::new(),
            hearing_id: HearingId::new(),
            case_name: "Cache v Test".to_string(),
            case_number: "C-1".to_string(),
            case_type: "Civil".to_string(),
            hearing_venue_name: "Leeds".to_string(),
            scheduled_at: Utc::now(),
            scheduled_duration_minutes: 30,
            state: ConferenceState::NotStarted,
            participants: Vec::new(),
            endpoints: Vec::new(),
            allocated_cso: None,
        }
    }

    fn cache_with(mock: &Arc<MockVideoApiClient>) -> Arc<ConferenceCache> {
        Arc::new(ConferenceCache::new(
            Arc::clone(mock) as Arc<dyn VideoApiClient>,
            TTL,
            LOCK_TIMEOUT,
        ))
    }

    #[tokio::test]
    async fn test_get_conference_miss_does_not_load() {
        let mock = MockVideoApiClient::with_conferences([conference()]);
        let cache = cache_with(&mock);

        assert!(cache.get_conference(ConferenceId::new()).await.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_add_loads_once_then_hits() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        assert_eq!(cache.get_or_add(conf.id).await.unwrap(), conf);
        assert_eq!(cache.get_or_add(conf.id).await.unwrap(), conf);
        assert_eq!(cache.get_conference(conf.id).await, Some(conf));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_or_add_loads_once() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        mock.set_delay(Some(Duration::from_millis(200)));
        let cache = cache_with(&mock);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_add(conf.id).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().id, conf.id);
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_and_downstream_errors_propagate() {
        let mock = Arc::new(MockVideoApiClient::new());
        let cache = cache_with(&mock);
        let id = ConferenceId::new();

        assert!(matches!(
            cache.get_or_add(id).await,
            Err(HubError::ConferenceNotFound(missing)) if missing == id
        ));

        mock.set_failure(Some(DownstreamError::Unavailable("boom".to_string())));
        assert!(matches!(
            cache.get_or_add(id).await,
            Err(HubError::Downstream(DownstreamError::Unavailable(_)))
        ));

        // No retries inside the cache
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiry() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        cache.get_or_add(conf.id).await.unwrap();

        // Reads inside the window keep extending it
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(45)).await;
            assert!(cache.get_conference(conf.id).await.is_some());
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_conference(conf.id).await.is_none());

        cache.get_or_add(conf.id).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_lease_commit_writes_back() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        let mut lease = cache.lock(conf.id).await.unwrap();
        lease.conference_mut().state = ConferenceState::InSession;
        lease.commit().await;

        assert_eq!(
            cache.get_conference(conf.id).await.unwrap().state,
            ConferenceState::InSession
        );
    }

    #[tokio::test]
    async fn test_dropped_lease_leaves_cache_unchanged() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        {
            let mut lease = cache.lock(conf.id).await.unwrap();
            lease.conference_mut().state = ConferenceState::Closed;
        }

        assert_eq!(
            cache.get_conference(conf.id).await.unwrap().state,
            ConferenceState::NotStarted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_while_held() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        let _held = cache.lock(conf.id).await.unwrap();
        let result = cache.lock(conf.id).await;

        assert!(matches!(result, Err(HubError::ConferenceBusy(id)) if id == conf.id));
    }

    #[tokio::test]
    async fn test_mutations_serialize_per_conference() {
        let mut conf = conference();
        conf.scheduled_duration_minutes = 0;
        let conference_id = conf.id;
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let mut lease = cache.lock(conference_id).await.unwrap();
                    let current = lease.conference().scheduled_duration_minutes;
                    tokio::task::yield_now().await;
                    lease.conference_mut().scheduled_duration_minutes = current + 1;
                    lease.commit().await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            cache
                .get_conference(conference_id)
                .await
                .unwrap()
                .scheduled_duration_minutes,
            20
        );
    }

    #[tokio::test]
    async fn test_refresh_reloads_and_drops_missing() {
        let mut conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);
        cache.get_or_add(conf.id).await.unwrap();

        conf.case_name = "Renamed".to_string();
        mock.insert(conf.clone());
        let refreshed = cache.refresh(conf.id).await.unwrap().unwrap();
        assert_eq!(refreshed.case_name, "Renamed");

        mock.remove(conf.id);
        assert!(cache.refresh(conf.id).await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let fresh = conference();
        let old = conference();
        let mock = MockVideoApiClient::with_conferences([fresh.clone(), old.clone()]);
        let cache = cache_with(&mock);

        cache.get_or_add(old.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.get_or_add(fresh.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(cache.evict_expired().await, 1);
        assert_eq!(cache.conference_ids().await, vec![fresh.id]);
    }

    #[tokio::test]
    async fn test_lease_waiting_on_removed_slot_commits_to_current() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);
        cache.get_or_add(conf.id).await.unwrap();

        // Hold the gate of the cached slot so the next lease has to wait on it
        let old_slot = cache.existing_slot(conf.id).await.unwrap();
        let held = Arc::clone(&old_slot.gate).lock_owned().await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let mut lease = cache.lock(conf.id).await.unwrap();
                lease.conference_mut().state = ConferenceState::InSession;
                lease.commit().await;
            })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert!(cache.remove_slot(conf.id, &old_slot).await);
        drop(held);
        waiter.await.unwrap();

        assert_eq!(
            cache.get_conference(conf.id).await.map(|c| c.state),
            Some(ConferenceState::InSession)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_skips_conference_under_lease() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        let mut lease = cache.lock(conf.id).await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.evict_expired().await, 0);

        lease.conference_mut().state = ConferenceState::InSession;
        lease.commit().await;
        assert_eq!(
            cache.get_conference(conf.id).await.map(|c| c.state),
            Some(ConferenceState::InSession)
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_after_eviction_binds_to_new_slot() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);
        cache.get_or_add(conf.id).await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.evict_expired().await, 1);

        let mut lease = cache.lock(conf.id).await.unwrap();
        lease.conference_mut().state = ConferenceState::Paused;
        lease.commit().await;

        assert_eq!(
            cache.get_conference(conf.id).await.map(|c| c.state),
            Some(ConferenceState::Paused)
        );
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_saved_lease_stays_held() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_with(&mock);

        let mut lease = cache.lock(conf.id).await.unwrap();
        lease.conference_mut().state = ConferenceState::InSession;
        let saved = lease.save().await;

        assert_eq!(saved.state, ConferenceState::InSession);
        assert_eq!(
            cache.get_conference(conf.id).await.map(|c| c.state),
            Some(ConferenceState::InSession)
        );
        let slot = cache.existing_slot(conf.id).await.unwrap();
        assert!(slot.gate.try_lock().is_err());

        drop(lease);
        assert!(slot.gate.try_lock().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_conferences_with_participant() {
        let mut mine = conference();
        mine.participants.push(crate::models::Participant {
            id: common::types::ParticipantId::new(),
            username: "judge@court.test".to_string(),
            display_name: "Judge".to_string(),
            role: crate::models::Role::Judge,
            state: crate::models::ParticipantState::NotSignedIn,
            current_room: None,
        });
        let other = conference();
        let mock = MockVideoApiClient::with_conferences([mine.clone(), other.clone()]);
        let cache = cache_with(&mock);
        cache.get_or_add(mine.id).await.unwrap();
        cache.get_or_add(other.id).await.unwrap();

        assert_eq!(
            cache.conferences_with_participant("JUDGE@court.test").await,
            vec![mine.id]
        );
        assert!(cache
            .conferences_with_participant("nobody@court.test")
            .await
            .is_empty());

        // Scanning does not keep entries alive
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(cache
            .conferences_with_participant("judge@court.test")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_value() {
        let conf = conference();
        let mock = Arc::new(MockVideoApiClient::new());
        let cache = cache_with(&mock);

        cache.update(conf.clone()).await.unwrap();
        assert_eq!(cache.get_conference(conf.id).await, Some(conf));
        assert_eq!(mock.call_count(), 0);
    }
}
