//! Wireboard Room Relay Library
//!
//! This library provides the core functionality for the Wireboard Room
//! Relay - a stateful WebSocket relay responsible for:
//!
//! - Fanning diagram state updates out to every other member of a room
//! - Tracking room membership and pushing `user_count` after every change
//! - Creating rooms lazily on first join and discarding them once empty
//! - Graceful shutdown that closes every open connection
//!
//! # Architecture
//!
//! The relay uses a small actor hierarchy:
//!
//! ```text
//! RoomRegistryActor (singleton per relay instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per live room)
//!         └── owns the member set and all broadcasting
//! ```
//!
//! The gateway sits in front as a thin axum layer: it answers the health
//! probes, refuses upgrades with no room identifier, and runs one reader
//! and one writer task per upgraded connection.
//!
//! # Key Design Decisions
//!
//! - **Rooms carry no content**: the relay forwards `"update"` payloads
//!   verbatim and keeps no document state
//! - **Room ids are opaque**: the raw request path remainder, with no
//!   decoding or validation
//! - **Best-effort fan-out**: peer sends never block and are never retried;
//!   a dead peer is skipped, not waited on
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation (registry and rooms)
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`gateway`] - HTTP/WebSocket gateway
//! - [`observability`] - Health probes
//! - [`protocol`] - Wire envelopes

pub mod actors;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod protocol;
