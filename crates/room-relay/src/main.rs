//! Room Relay
//!
//! Stateful WebSocket relay for real-time collaborative diagram rooms.
//!
//! # Endpoints
//!
//! - `GET /<roomId>` - WebSocket upgrade; the path remainder is the room id
//! - `GET /health` - liveness probe (`200 OK`, body `OK`)
//! - `GET /ready` - readiness probe
//! - `GET /metrics` - Prometheus metrics
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`RegistryHandle`)
//! 4. Bind the listener and start serving (fail fast on bind errors)
//! 5. Wait for shutdown signal, then drain the actor system

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use room_relay::actors::{RegistryHandle, RelayMetrics};
use room_relay::config::Config;
use room_relay::gateway::{self, GatewayState, HeartbeatConfig};
use room_relay::observability::HealthState;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the registry may spend draining rooms on shutdown.
const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Relay");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        relay_id = %config.relay_id,
        port = config.port,
        ping_interval_seconds = config.ping_interval_seconds,
        pong_timeout_seconds = config.pong_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    let metrics = RelayMetrics::new();
    let registry = RegistryHandle::new(config.relay_id.clone(), Arc::clone(&metrics));
    info!("Actor system initialized");

    // Create shutdown token as a child of the registry's root token so the
    // server stops when the actor system does
    let shutdown_token = registry.child_token();

    // Compose the HTTP surface: probes + WebSocket routes + /metrics
    let state = GatewayState {
        registry: registry.clone(),
        metrics,
        heartbeat: HeartbeatConfig::from_config(&config),
    };

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = gateway::app(state, Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        format!("Failed to bind listener to {addr}: {e}")
    })?;
    info!(addr = %addr, "Listener bound successfully");

    health_state.set_ready();

    // Spawn server task
    let server_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %addr, "Gateway serving");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown_token.cancelled().await;
            info!("Gateway shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Gateway server failed");
        }
    });

    // Wait for shutdown signal
    info!("Room Relay running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Stop accepting new connections
    shutdown_token.cancel();

    // Drain the actor system; cancelling the rooms closes every open
    // connection via their outbound channels
    if let Err(e) = registry.shutdown(SHUTDOWN_DRAIN_DEADLINE).await {
        warn!(error = %e, "Actor system shutdown error");
    }

    info!("Room Relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
