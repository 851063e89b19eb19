//! Observability endpoints and state.
//!
//! - [`health`] - liveness/readiness probes and the shared `HealthState`

pub mod health;

pub use health::{health_router, HealthState};
