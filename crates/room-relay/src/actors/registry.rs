//! `RoomRegistryActor` - singleton supervisor for room actors.
//!
//! The registry is the top-level actor in the relay hierarchy:
//!
//! - Singleton per relay instance
//! - Owns the room id -> room actor map; rooms are created lazily on the
//!   first join and retired when their task finishes (room emptied)
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the registry:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to all rooms)
//! 3. Waits for room tasks to drain, which closes every member connection

use crate::actors::messages::{Member, RegistryMessage, RegistryStatus};
use crate::actors::metrics::{ActorType, MailboxMonitor, RelayMetrics};
use crate::actors::room::{RoomActor, RoomHandle};
use crate::errors::RelayError;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// How long to wait for each room task during shutdown.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts to admit a member before giving up. The second attempt always
/// runs against a freshly spawned room actor, so it cannot lose the same
/// race again.
const JOIN_ATTEMPTS: usize = 2;

/// Handle to the `RoomRegistryActor`.
///
/// This is the public interface for interacting with the registry.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RegistryHandle {
    /// Create a new `RoomRegistryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(relay_id: String, metrics: Arc<RelayMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor::new(relay_id, receiver, cancel_token.clone(), metrics);

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Admit a member to a room, creating the room if it does not exist.
    ///
    /// Returns the room handle the connection task uses for relay and leave.
    pub async fn join(&self, room_id: String, member: Member) -> Result<RoomHandle, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Join {
                room_id,
                member,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current registry status.
    pub async fn status(&self) -> Result<RegistryStatus, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that must stop with the registry.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    /// Handle to the room actor.
    handle: RoomHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `RoomRegistryActor` implementation.
///
/// This struct owns the actor state and runs the message loop.
pub struct RoomRegistryActor {
    /// Relay instance ID.
    relay_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Managed rooms by ID.
    rooms: HashMap<String, ManagedRoom>,
    /// Whether the registry is accepting new members.
    accepting_new: bool,
    /// Shared relay metrics.
    metrics: Arc<RelayMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RoomRegistryActor {
    /// Create a new registry actor (not started).
    fn new(
        relay_id: String,
        receiver: mpsc::Receiver<RegistryMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Registry, &relay_id);

        Self {
            relay_id,
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor.registry", fields(relay_id = %self.relay_id))]
    async fn run(mut self) {
        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            "RoomRegistryActor started"
        );

        loop {
            // Retire room actors whose task has finished (room emptied)
            self.check_room_health().await;

            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "relay.actor.registry",
                                relay_id = %self.relay_id,
                                "RoomRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomRegistryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Join {
                room_id,
                member,
                respond_to,
            } => {
                let result = self.handle_join(room_id, member).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let status = self.get_status();
                let _ = respond_to.send(status);
            }

            RegistryMessage::Shutdown {
                deadline: _,
                respond_to,
            } => {
                let result = self.initiate_shutdown();
                let _ = respond_to.send(result);
            }
        }
    }

    /// Admit a member to a room, creating the room lazily.
    ///
    /// A room actor exits the moment its member set empties, so a join can
    /// race with that exit: the admission lands in a mailbox that is never
    /// drained. That surfaces here as `RoomClosed`, and the join is retried
    /// against a fresh actor.
    async fn handle_join(
        &mut self,
        room_id: String,
        member: Member,
    ) -> Result<RoomHandle, RelayError> {
        if !self.accepting_new {
            return Err(RelayError::Draining);
        }

        for _attempt in 0..JOIN_ATTEMPTS {
            let handle = self.live_room(&room_id);
            match handle.join(member.clone()).await {
                Ok(()) => return Ok(handle),
                Err(RelayError::RoomClosed) => {
                    debug!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        room_id = %room_id,
                        "Room closed while admitting member, retrying against a fresh room"
                    );
                    self.rooms.remove(&room_id);
                }
                Err(other) => return Err(other),
            }
        }

        Err(RelayError::Internal(
            "room restart raced with join".to_string(),
        ))
    }

    /// Get the live room actor for an id, spawning one if the entry is
    /// absent or its task has finished.
    fn live_room(&mut self, room_id: &str) -> RoomHandle {
        if let Some(managed) = self.rooms.get(room_id) {
            if !managed.task_handle.is_finished() {
                return managed.handle.clone();
            }
            // The previous room with this id emptied out; a new join starts
            // a fresh room.
            self.rooms.remove(room_id);
        }

        debug!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            room_id = %room_id,
            "Creating room actor"
        );

        let room_token = self.cancel_token.child_token();
        let (handle, task_handle) = RoomActor::spawn(
            room_id.to_string(),
            room_token,
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            room_id.to_string(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );

        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        handle
    }

    /// Get current registry status.
    fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            room_count: self.metrics.room_count(),
            member_count: self.metrics.member_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self) -> Result<(), RelayError> {
        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            room_count = self.rooms.len(),
            "Initiating graceful shutdown"
        );

        // Stop accepting new members
        self.accepting_new = false;

        // Cancel the root token (propagates to all rooms)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Cancel all room actors (already done via parent token, but be explicit)
        for (room_id, managed) in &self.rooms {
            debug!(
                target: "relay.actor.registry",
                relay_id = %self.relay_id,
                room_id = %room_id,
                "Cancelling room actor"
            );
            managed.handle.cancel();
        }

        // Wait for all room tasks to complete
        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
        }

        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            "Graceful shutdown complete"
        );
    }

    /// Retire room actors whose task has finished.
    async fn check_room_health(&mut self) {
        let mut finished_rooms = Vec::new();

        for (room_id, managed) in &self.rooms {
            if managed.task_handle.is_finished() {
                finished_rooms.push(room_id.clone());
            }
        }

        for room_id in finished_rooms {
            if let Some(managed) = self.rooms.remove(&room_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        // Clean exit, the room emptied out
                        debug!(
                            target: "relay.actor.registry",
                            relay_id = %self.relay_id,
                            room_id = %room_id,
                            "Room actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "relay.actor.registry",
                                relay_id = %self.relay_id,
                                room_id = %room_id,
                                error = ?join_error,
                                "Room actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Room);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    fn test_registry(relay_id: &str) -> RegistryHandle {
        RegistryHandle::new(relay_id.to_string(), RelayMetrics::new())
    }

    fn test_member(room_id: &str) -> (Member, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Member::new(Uuid::new_v4(), room_id.to_string(), tx), rx)
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> String {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame should arrive")
            .expect("channel should be open")
    }

    /// Poll the registry until the room count reaches `expected`.
    async fn wait_for_room_count(handle: &RegistryHandle, expected: usize) {
        for _ in 0..100 {
            let status = handle.status().await.expect("status should be available");
            if status.room_count == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = handle.status().await.expect("status should be available");
        assert_eq!(status.room_count, expected, "room count never converged");
    }

    #[tokio::test]
    async fn test_join_creates_room_lazily() {
        let handle = test_registry("relay-test-001");
        let (member, mut rx) = test_member("alpha");

        let room = handle.join("alpha".to_string(), member).await.unwrap();
        assert_eq!(room.room_id(), "alpha");
        assert_eq!(recv_frame(&mut rx).await, r#"{"type":"user_count","count":1}"#);

        let status = handle.status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert_eq!(status.member_count, 1);
        assert!(!status.is_draining);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_second_member_joins_existing_room() {
        let handle = test_registry("relay-test-002");
        let (member_a, mut rx_a) = test_member("alpha");
        let (member_b, mut rx_b) = test_member("alpha");

        let room_a = handle.join("alpha".to_string(), member_a).await.unwrap();
        let room_b = handle.join("alpha".to_string(), member_b).await.unwrap();

        assert_eq!(room_a.room_id(), room_b.room_id());
        assert_eq!(recv_frame(&mut rx_a).await, r#"{"type":"user_count","count":1}"#);
        assert_eq!(recv_frame(&mut rx_a).await, r#"{"type":"user_count","count":2}"#);
        assert_eq!(recv_frame(&mut rx_b).await, r#"{"type":"user_count","count":2}"#);

        let status = handle.status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert_eq!(status.member_count, 2);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let handle = test_registry("relay-test-003");
        let (member_a, mut rx_a) = test_member("alpha");
        let (member_c, mut rx_c) = test_member("beta");
        let sender_id = member_a.member_id;

        let room_alpha = handle.join("alpha".to_string(), member_a).await.unwrap();
        let _room_beta = handle.join("beta".to_string(), member_c).await.unwrap();
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_c).await;

        let envelope =
            crate::protocol::ClientEnvelope::parse(r#"{"type":"update","xml":"<diagram/>"}"#)
                .unwrap();
        room_alpha.relay(sender_id, envelope).await.unwrap();

        // The beta member never sees alpha's update.
        assert!(timeout(Duration::from_millis(100), rx_c.recv()).await.is_err());

        let status = handle.status().await.unwrap();
        assert_eq!(status.room_count, 2);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_vacated_room_is_removed_and_recreated_fresh() {
        let handle = test_registry("relay-test-004");
        let (member_a, mut rx_a) = test_member("solo");
        let member_a_id = member_a.member_id;

        let room = handle.join("solo".to_string(), member_a).await.unwrap();
        recv_frame(&mut rx_a).await;

        room.leave(member_a_id).await.unwrap();
        wait_for_room_count(&handle, 0).await;

        // A new join with the same id starts a fresh, one-member room.
        let (member_b, mut rx_b) = test_member("solo");
        handle.join("solo".to_string(), member_b).await.unwrap();
        assert_eq!(recv_frame(&mut rx_b).await, r#"{"type":"user_count","count":1}"#);

        let status = handle.status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert_eq!(status.member_count, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_initial_status_is_empty() {
        let handle = test_registry("relay-test-005");

        let status = handle.status().await.unwrap();
        assert_eq!(status.room_count, 0);
        assert_eq!(status.member_count, 0);
        assert!(!status.is_draining);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_closes_member_connections() {
        let handle = test_registry("relay-test-006");
        let (member, mut rx) = test_member("alpha");

        handle.join("alpha".to_string(), member).await.unwrap();
        recv_frame(&mut rx).await;

        let result = handle.shutdown(Duration::from_secs(5)).await;
        assert!(result.is_ok());

        // Room actors exit on cancellation and drop the member channels.
        assert!(matches!(
            timeout(Duration::from_secs(1), rx.recv()).await,
            Ok(None)
        ));

        // Give time for cancellation to propagate
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_token_propagates_to_children() {
        let handle = test_registry("relay-test-007");

        assert!(!handle.is_cancelled());

        let child = handle.child_token();
        assert!(!child.is_cancelled());

        handle.cancel();

        // Give time for cancellation to propagate
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(handle.is_cancelled());
        assert!(child.is_cancelled());
    }
}
