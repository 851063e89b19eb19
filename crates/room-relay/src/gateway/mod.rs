//! Connection gateway.
//!
//! - [`ws`] - WebSocket upgrade routes and per-connection pumps

pub mod ws;

pub use ws::{ws_router, GatewayState, HeartbeatConfig};

use crate::observability::{health_router, HealthState};
use axum::Router;
use std::sync::Arc;

/// Compose the relay's HTTP surface: probes plus the WebSocket routes.
///
/// The explicit `/health` and `/ready` routes take precedence over the
/// room wildcard, so those paths are never treated as room identifiers.
/// `main` additionally merges the Prometheus `/metrics` route.
pub fn app(state: GatewayState, health: Arc<HealthState>) -> Router {
    health_router(health).merge(ws_router(state))
}
