//! Test server harness for end-to-end testing.
//!
//! Provides `TestRelayServer` for spawning real relay instances in tests.

use room_relay::actors::{RegistryHandle, RelayMetrics};
use room_relay::gateway::{self, GatewayState, HeartbeatConfig};
use room_relay::observability::HealthState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the relay in end-to-end tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_two_clients() -> Result<(), anyhow::Error> {
///     let server = TestRelayServer::spawn().await?;
///     let mut alice = WsClient::connect(&server.ws_url("/alpha")).await?;
///     alice.expect_user_count(1).await?;
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    _handle: JoinHandle<()>,
}

impl TestRelayServer {
    /// Spawn a relay with heartbeat reaping disabled.
    ///
    /// The server binds to a random available port (`127.0.0.1:0`) and runs
    /// the real gateway router in the background.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_heartbeat(HeartbeatConfig::disabled()).await
    }

    /// Spawn a relay with the given heartbeat timings.
    pub async fn spawn_with_heartbeat(heartbeat: HeartbeatConfig) -> Result<Self, anyhow::Error> {
        let metrics = RelayMetrics::new();
        let relay_id = format!("relay-test-{}", uuid::Uuid::new_v4());
        let registry = RegistryHandle::new(relay_id, Arc::clone(&metrics));

        let state = GatewayState {
            registry: registry.clone(),
            metrics,
            heartbeat,
        };
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let app = gateway::app(state, health);

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
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            registry,
            _handle: handle,
        })
    }

    /// Get the base HTTP URL of the test server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get a WebSocket URL for the given path (e.g. `"/alpha"`).
    #[must_use]
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Get the socket address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get a handle to the server's room registry.
    #[must_use]
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        // Stop the server task and the actor system when the test finishes.
        self._handle.abort();
        self.registry.cancel();
    }
}
