//! Hearing Hub
//!
//! Entry point for the hearing event hub. Receives video platform
//! callbacks and internal events, and pushes status changes to clients.

use hearing_hub::config::Config;
use hearing_hub::observability::metrics::init_metrics_recorder;
use hearing_hub::routes::{self, AppState};
use hearing_hub::services::{HttpUserApiClient, HttpVideoApiClient};
use hearing_hub::tasks::start_cache_refresh;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearing_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hearing Hub");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        video_api_url = %config.video_api_url,
        user_api_url = %config.user_api_url,
        cache_ttl_seconds = config.cache_ttl_seconds,
        cache_refresh_hour = config.cache_refresh_hour,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let video_api = HttpVideoApiClient::new(
        config.video_api_url.clone(),
        config.downstream_api_token.clone(),
        config.downstream_timeout(),
    )
    .map_err(|e| {
        error!("Failed to create Video API client: {}", e);
        e
    })?;
    let user_api = HttpUserApiClient::new(
        config.user_api_url.clone(),
        config.downstream_api_token.clone(),
        config.downstream_timeout(),
    )
    .map_err(|e| {
        error!("Failed to create User API client: {}", e);
        e
    })?;

    let shutdown_token = CancellationToken::new();
    let bind_address = config.bind_address.clone();
    let refresh_hour = config.cache_refresh_hour;

    let state = Arc::new(AppState::new(
        config,
        Arc::new(video_api),
        Arc::new(user_api),
        shutdown_token.clone(),
    ));

    let refresh_task = tokio::spawn(start_cache_refresh(
        Arc::clone(&state.cache),
        refresh_hour,
        shutdown_token.child_token(),
    ));

    let app = routes::build_routes(Arc::clone(&state), metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Hearing Hub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_token = shutdown_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Hub sockets are long-lived; close them so the server can drain
            serve_token.cancel();
        })
        .await?;

    shutdown_token.cancel();
    if let Err(e) = refresh_task.await {
        error!("Cache refresh task failed: {}", e);
    }

    info!("Hearing Hub shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
