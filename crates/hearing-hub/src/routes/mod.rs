//! HTTP routes for Hearing Hub.
//!
//! Defines the Axum router and application state.

use crate::cache::ConferenceCache;
use crate::config::Config;
use crate::events::EventProcessor;
use crate::handlers;
use crate::hub::{HubActorHandle, HubDispatcher};
use crate::internal_events::{default_registry, InternalEventHandlerRegistry};
use crate::services::{UserApiClient, VideoApiClient};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Conference read model.
    pub cache: Arc<ConferenceCache>,

    /// Callback pipeline.
    pub processor: Arc<EventProcessor>,

    /// Internal event handlers, filled at startup.
    pub registry: Arc<InternalEventHandlerRegistry>,

    /// Push side of the hub.
    pub dispatcher: HubDispatcher,

    /// Resolves hub users to their roles.
    pub user_api: Arc<dyn UserApiClient>,

    /// Cancelled on shutdown; closes hub sockets and stops the hub actor.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the cache, hub, processor and handler registry together.
    ///
    /// Spawns the hub actor, so this must run inside a Tokio runtime.
    pub fn new(
        config: Config,
        video_api: Arc<dyn VideoApiClient>,
        user_api: Arc<dyn UserApiClient>,
        shutdown: CancellationToken,
    ) -> Self {
        let cache = Arc::new(ConferenceCache::new(
            video_api,
            config.cache_ttl(),
            config.lock_timeout(),
        ));
        let dispatcher = HubDispatcher::new(HubActorHandle::new(shutdown.child_token()));
        let processor = Arc::new(EventProcessor::new(Arc::clone(&cache), dispatcher.clone()));
        let registry = Arc::new(default_registry(&cache, &dispatcher));

        Self {
            config,
            cache,
            processor,
            registry,
            dispatcher,
            user_api,
            shutdown,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/callback` - video platform callbacks
/// - `/internal-event/:kind` - internal events from other services
/// - `/hub` - WebSocket push channel
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/callback", post(handlers::handle_callback))
        .route("/internal-event/:kind", post(handlers::handle_internal_event))
        .route("/hub", get(handlers::hub_socket))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
