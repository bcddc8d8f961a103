//! Daily conference cache refresh.
//!
//! Runs once a day at the configured UTC hour. Each run drops expired
//! entries, then reloads every remaining conference from the Video API.
//! Conferences the Video API no longer knows are dropped.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A run already
//! in progress finishes first.

use crate::cache::ConferenceCache;
use crate::observability::metrics;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts from one refresh run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub evicted: usize,
    pub refreshed: usize,
    /// No longer known to the Video API.
    pub removed: usize,
    pub failed: usize,
}

/// Time from `now` until the next `hour`:00 UTC.
///
/// Exactly on the hour counts as already passed, so the result is always
/// positive and at most one day.
pub fn delay_until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };

    (next - now).to_std().unwrap_or(ONE_DAY)
}

/// Start the refresh loop.
///
/// # Arguments
///
/// * `cache` - Conference cache to maintain
/// * `hour` - UTC hour (0-23) of the daily run
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "hh.task.cache_refresh", fields(hour = hour))]
pub async fn start_cache_refresh(
    cache: Arc<ConferenceCache>,
    hour: u32,
    cancel_token: CancellationToken,
) {
    let initial_delay = delay_until_next_run(Utc::now(), hour);
    info!(
        target: "hh.task.cache_refresh",
        hour = hour,
        initial_delay_secs = initial_delay.as_secs(),
        "Starting cache refresh task"
    );

    run_loop(&cache, initial_delay, ONE_DAY, &cancel_token).await;

    info!(target: "hh.task.cache_refresh", "Cache refresh task stopped");
}

/// Wait `initial_delay`, then run every `period` until cancelled.
pub(crate) async fn run_loop(
    cache: &ConferenceCache,
    initial_delay: Duration,
    period: Duration,
    cancel_token: &CancellationToken,
) {
    let mut interval =
        tokio::time::interval_at(tokio::time::Instant::now() + initial_delay, period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_refresh(cache).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "hh.task.cache_refresh",
                    "Cache refresh task received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

/// One refresh pass over the cache.
pub(crate) async fn run_refresh(cache: &ConferenceCache) -> RefreshSummary {
    let mut summary = RefreshSummary {
        evicted: cache.evict_expired().await,
        ..RefreshSummary::default()
    };

    for conference_id in cache.conference_ids().await {
        match cache.refresh(conference_id).await {
            Ok(Some(_)) => summary.refreshed += 1,
            Ok(None) => summary.removed += 1,
            Err(e) => {
                warn!(
                    target: "hh.task.cache_refresh",
                    conference_id = %conference_id,
                    error = %e,
                    "Failed to refresh conference"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        target: "hh.task.cache_refresh",
        evicted = summary.evicted,
        refreshed = summary.refreshed,
        removed = summary.removed,
        failed = summary.failed,
        "Cache refresh complete"
    );
    metrics::record_cache_refresh(
        summary.evicted + summary.removed,
        summary.refreshed,
        summary.failed,
    );
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{Conference, ConferenceState};
    use crate::services::{DownstreamError, MockVideoApiClient, VideoApiClient};
    use chrono::TimeZone;
    use common::types::{ConferenceId, HearingId};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap()
    }

    fn conference() -> Conference {
        Conference {
            id: ConferenceId::new(),
            hearing_id: HearingId::new(),
            case_name: "Refresh v Test".to_string(),
            case_number: "R-1".to_string(),
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

    fn cache_over(mock: &Arc<MockVideoApiClient>, ttl: Duration) -> ConferenceCache {
        ConferenceCache::new(
            Arc::clone(mock) as Arc<dyn VideoApiClient>,
            ttl,
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_delay_from_late_evening_to_early_morning() {
        assert_eq!(
            delay_until_next_run(at(23, 0), 2),
            Duration::from_secs(3 * 60 * 60)
        );
    }

    #[test]
    fn test_delay_later_same_day() {
        assert_eq!(
            delay_until_next_run(at(1, 30), 2),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_delay_exactly_on_the_hour_waits_a_day() {
        assert_eq!(delay_until_next_run(at(2, 0), 2), ONE_DAY);
    }

    #[test]
    fn test_delay_midnight_hour() {
        assert_eq!(
            delay_until_next_run(at(23, 59), 0),
            Duration::from_secs(60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refresh_evicts_refreshes_and_removes() {
        let stale = conference();
        let kept = conference();
        let gone = conference();
        let mock = MockVideoApiClient::with_conferences([stale.clone(), kept.clone(), gone.clone()]);
        let cache = cache_over(&mock, Duration::from_secs(60));

        cache.get_or_add(stale.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.get_or_add(kept.id).await.unwrap();
        cache.get_or_add(gone.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        mock.remove(gone.id);

        let summary = run_refresh(&cache).await;

        assert_eq!(
            summary,
            RefreshSummary {
                evicted: 1,
                refreshed: 1,
                removed: 1,
                failed: 0
            }
        );
        assert_eq!(cache.conference_ids().await, vec![kept.id]);
    }

    #[tokio::test]
    async fn test_run_refresh_keeps_entries_on_failure() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = cache_over(&mock, Duration::from_secs(60));
        cache.get_or_add(conf.id).await.unwrap();

        mock.set_failure(Some(DownstreamError::Unavailable("down".to_string())));
        let summary = run_refresh(&cache).await;

        assert_eq!(summary.failed, 1);
        assert!(cache.get_conference(conf.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_for_initial_delay_and_stops_on_cancel() {
        let conf = conference();
        let mock = MockVideoApiClient::with_conferences([conf.clone()]);
        let cache = Arc::new(cache_over(&mock, Duration::from_secs(ONE_DAY.as_secs() * 2)));
        cache.get_or_add(conf.id).await.unwrap();
        assert_eq!(mock.call_count(), 1);

        let token = CancellationToken::new();
        let task = {
            let cache = Arc::clone(&cache);
            let token = token.clone();
            tokio::spawn(async move {
                run_loop(&cache, Duration::from_secs(3 * 60 * 60), ONE_DAY, &token).await;
            })
        };

        tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(mock.call_count(), 1);

        tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(mock.call_count(), 2);

        token.cancel();
        task.await.unwrap();
    }
}
