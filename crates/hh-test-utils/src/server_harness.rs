//! Test server harness for E2E testing
//!
//! Provides `TestHubServer` for spawning real Hearing Hub instances in tests.
//! Downstream APIs are replaced by the in-memory mocks, which tests reach
//! through `video_api()` and `user_api()`.

use hearing_hub::config::Config;
use hearing_hub::routes::{self, AppState};
use hearing_hub::services::{
    MockUserApiClient, MockVideoApiClient, UserApiClient, VideoApiClient,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning Hearing Hub in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_metrics_e2e() -> Result<(), anyhow::Error> {
///     let server = TestHubServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/metrics", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestHubServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    video_api: Arc<MockVideoApiClient>,
    user_api: Arc<MockUserApiClient>,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestHubServer {
    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use empty mock Video API and User API clients
    /// - Start the HTTP server in the background
    ///
    /// # Returns
    /// * `Ok(TestHubServer)` - Running server instance
    /// * `Err(anyhow::Error)` - If server spawn fails
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("HUB_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "VIDEO_API_URL".to_string(),
                "http://localhost:9001".to_string(),
            ),
            (
                "USER_API_URL".to_string(),
                "http://localhost:9002".to_string(),
            ),
            (
                "DOWNSTREAM_API_TOKEN".to_string(),
                "test-token".to_string(),
            ),
            ("CONFERENCE_LOCK_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let video_api = Arc::new(MockVideoApiClient::new());
        let user_api = Arc::new(MockUserApiClient::new());
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&video_api) as Arc<dyn VideoApiClient>,
            Arc::clone(&user_api) as Arc<dyn UserApiClient>,
            shutdown.clone(),
        ));

        // A local recorder handle; the global recorder is left alone so tests
        // can run in parallel
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        // Build routes using hearing-hub's real route builder
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            video_api,
            user_api,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the WebSocket URL of the hub endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/hub", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the shared application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Mock Video API backing the conference cache.
    pub fn video_api(&self) -> &Arc<MockVideoApiClient> {
        &self.video_api
    }

    /// Mock User API resolving hub users.
    pub fn user_api(&self) -> &Arc<MockUserApiClient> {
        &self.user_api
    }
}

impl Drop for TestHubServer {
    fn drop(&mut self) {
        // Close hub sockets and the hub actor, then stop the HTTP server
        self.shutdown.cancel();
        self._handle.abort();
    }
}
