//! Room Relay error types.
//!
//! All failures are handled locally by the gateway or the actor system;
//! none of them are surfaced to other clients. The wire protocol has no
//! error channel back to a sender, so these types exist for logging and
//! for plumbing between components.

use thiserror::Error;

/// Room Relay error type.
///
/// Configuration failures have their own type, [`crate::config::ConfigError`];
/// they can only happen before the actor system exists.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay is draining (graceful shutdown); no new members accepted.
    #[error("Relay is draining")]
    Draining,

    /// The target room's actor has already exited.
    #[error("Room is closed")]
    RoomClosed,

    /// Internal error (channel plumbing failures).
    #[error("Internal error: {0}")]
    Internal(String),
}
