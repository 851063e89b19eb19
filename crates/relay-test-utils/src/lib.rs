//! Test utilities for Room Relay end-to-end tests.
//!
//! - [`harness`] - `TestRelayServer`, spawns the real gateway on a random port
//! - [`client`] - `WsClient`, a `tokio-tungstenite` client with assertion helpers

pub mod client;
pub mod harness;

pub use client::WsClient;
pub use harness::TestRelayServer;
