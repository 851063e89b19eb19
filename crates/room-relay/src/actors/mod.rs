//! Actor model implementation for the Room Relay.
//!
//! This module implements the relay's actor hierarchy:
//!
//! ```text
//! RoomRegistryActor (singleton per relay instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per live room)
//!         └── owns the member set and all broadcasting
//! ```
//!
//! # Key Design Decisions
//!
//! - **One task per room**: membership changes and broadcasts for a room are
//!   serialized by its actor; distinct rooms never block each other
//! - **Rooms exist iff non-empty**: a room actor exits when its member set
//!   empties, and the registry retires the finished task
//! - **Non-blocking fan-out**: peer sends use bounded channels and
//!   `try_send`; a dead or slow member is skipped, never waited on
//! - **CancellationToken propagation**: the registry's root token reaches
//!   every room for graceful shutdown
//!
//! # Modules
//!
//! - [`registry`] - `RoomRegistryActor` singleton that supervises rooms
//! - [`room`] - `RoomActor` per live room, owns the member set
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and relay metrics

pub mod messages;
pub mod metrics;
pub mod registry;
pub mod room;

// Re-export primary types
pub use messages::{Member, RegistryStatus, RoomState};
pub use metrics::{MailboxMonitor, RelayMetrics, RelayMetricsSnapshot};
pub use registry::{RegistryHandle, RoomRegistryActor};
pub use room::{RoomActor, RoomHandle};
