//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Response patterns use `tokio::sync::oneshot` for
//! request-reply semantics.

use crate::errors::RelayError;
use crate::protocol::ClientEnvelope;

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Messages sent to the `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Admit a member to a room, creating the room if it does not exist.
    Join {
        room_id: String,
        member: Member,
        /// Response channel for the room handle or error.
        respond_to: oneshot::Sender<Result<crate::actors::room::RoomHandle, RelayError>>,
    },

    /// Get current registry status (for diagnostics and readiness).
    GetStatus {
        /// Response channel for registry status.
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Deadline for draining room actors.
        deadline: Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },
}

/// Messages sent to a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add a member to the room and broadcast the new member count.
    Join {
        member: Member,
        /// Response channel confirming admission.
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },

    /// Remove a member (idempotent). The actor exits once the room empties.
    Leave { member_id: Uuid },

    /// Forward an inbound envelope from a member to its peers.
    Relay {
        from_member: Uuid,
        envelope: ClientEnvelope,
    },

    /// Get current room state (for diagnostics and tests).
    GetState {
        /// Response channel for room state.
        respond_to: oneshot::Sender<RoomState>,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// One live connection, as seen by the actor system.
///
/// The `outbound` sender feeds the connection's writer task. Broadcasts use
/// `try_send`: a closed or saturated channel means the member is skipped for
/// that frame, never that the broadcast stalls.
#[derive(Debug, Clone)]
pub struct Member {
    /// Generated connection identifier.
    pub member_id: Uuid,
    /// The room this member was admitted to. Assigned once, never changes.
    pub room_id: String,
    /// Frame sink towards the client.
    pub outbound: mpsc::Sender<String>,
}

impl Member {
    /// Create a member bound to a room.
    #[must_use]
    pub fn new(member_id: Uuid, room_id: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            member_id,
            room_id,
            outbound,
        }
    }
}

/// Status of the `RoomRegistryActor`.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    /// Live rooms on this relay.
    pub room_count: usize,
    /// Live members across all rooms.
    pub member_count: usize,
    /// Whether the registry is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Current state of a room (for diagnostics and tests).
#[derive(Debug, Clone)]
pub struct RoomState {
    /// Room identifier.
    pub room_id: String,
    /// Current member count.
    pub member_count: usize,
    /// Room creation timestamp.
    pub created_at: i64,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}
