//! `RoomActor` - per-room actor that owns the member set.
//!
//! Each `RoomActor`:
//! - Owns all state for one room (the set of connected members)
//! - Broadcasts the member count after every join and every actual leave
//! - Fans out `"update"` envelopes to every member except the sender
//!
//! The actor task exits as soon as its member set empties; the registry
//! observes the finished task and retires the entry, so a room exists
//! exactly as long as it has members.

use crate::actors::messages::{Member, RoomMessage, RoomState};
use crate::actors::metrics::{ActorType, MailboxMonitor, RelayMetrics};
use crate::errors::RelayError;
use crate::protocol::{ClientEnvelope, ServerEnvelope};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
///
/// Held by the registry and by every connection task in the room. All
/// methods map a closed mailbox to [`RelayError::RoomClosed`], which callers
/// treat as "the room vanished" - a no-op, not a failure.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Admit a member to the room.
    pub async fn join(&self, member: Member) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                member,
                respond_to: tx,
            })
            .await
            .map_err(|_| RelayError::RoomClosed)?;

        // A dropped reply means the room emptied out and exited before the
        // admission was processed.
        rx.await.map_err(|_| RelayError::RoomClosed)?
    }

    /// Remove a member from the room (idempotent).
    pub async fn leave(&self, member_id: Uuid) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::Leave { member_id })
            .await
            .map_err(|_| RelayError::RoomClosed)
    }

    /// Forward an inbound envelope from a member to its peers.
    pub async fn relay(
        &self,
        from_member: Uuid,
        envelope: ClientEnvelope,
    ) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::Relay {
                from_member,
                envelope,
            })
            .await
            .map_err(|_| RelayError::RoomClosed)
    }

    /// Get current room state.
    pub async fn state(&self) -> Result<RoomState, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| RelayError::RoomClosed)?;

        rx.await.map_err(|_| RelayError::RoomClosed)
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    /// Room identifier (verbatim request path remainder).
    room_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the registry's token).
    cancel_token: CancellationToken,
    /// Members by connection ID.
    members: HashMap<Uuid, Member>,
    /// Room creation timestamp.
    created_at: i64,
    /// Shared relay metrics.
    metrics: Arc<RelayMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        cancel_token: CancellationToken,
        metrics: Arc<RelayMetrics>,
    ) -> (RoomHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            members: HashMap::new(),
            created_at: chrono::Utc::now().timestamp(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, &room_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        self.metrics.room_opened();
        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "relay.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "relay.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // Dropping the member set closes every outbound channel, which is
        // what tears the remaining connections down on cancellation.
        for _ in self.members.drain() {
            self.metrics.member_left();
        }
        self.metrics.room_closed();

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Join { member, respond_to } => {
                let result = self.handle_join(member);
                let _ = respond_to.send(result);
                false
            }

            RoomMessage::Leave { member_id } => self.handle_leave(member_id),

            RoomMessage::Relay {
                from_member,
                envelope,
            } => {
                self.handle_relay(from_member, &envelope);
                false
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
                false
            }
        }
    }

    /// Admit a member and broadcast the new member count to everyone,
    /// including the member that just joined.
    fn handle_join(&mut self, member: Member) -> Result<(), RelayError> {
        let member_id = member.member_id;
        self.members.insert(member_id, member);
        self.metrics.member_joined();

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            member_id = %member_id,
            member_count = self.members.len(),
            "Member joined"
        );

        self.broadcast_user_count();
        Ok(())
    }

    /// Remove a member if present. Returns true when the room emptied and
    /// the actor should exit (nobody is left to notify).
    fn handle_leave(&mut self, member_id: Uuid) -> bool {
        if self.members.remove(&member_id).is_none() {
            // Already gone - leave is idempotent.
            debug!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                member_id = %member_id,
                "Leave for unknown member ignored"
            );
            return false;
        }

        self.metrics.member_left();

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            member_id = %member_id,
            member_count = self.members.len(),
            "Member left"
        );

        if self.members.is_empty() {
            debug!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                "Last member left, closing room"
            );
            return true;
        }

        self.broadcast_user_count();
        false
    }

    /// Fan an `"update"` envelope out to every member except the sender.
    ///
    /// Any other envelope type is a forward-compatible no-op. A member whose
    /// channel is closed or saturated is skipped; one bad peer never aborts
    /// delivery to the rest of the room.
    fn handle_relay(&self, from_member: Uuid, envelope: &ClientEnvelope) {
        if !envelope.is_update() {
            debug!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                message_type = envelope.message_type(),
                "Ignoring envelope with unhandled type"
            );
            return;
        }

        let text = envelope.as_text();
        let mut delivered = 0usize;

        for (member_id, member) in &self.members {
            if *member_id == from_member {
                continue;
            }
            if member.outbound.try_send(text.to_string()).is_ok() {
                delivered += 1;
            } else {
                self.metrics.record_peer_send_skipped();
                debug!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    member_id = %member_id,
                    "Skipping member with unavailable channel"
                );
            }
        }

        self.metrics.record_update_relayed();
        debug!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            from_member = %from_member,
            delivered,
            "Relayed update"
        );
    }

    /// Push the current member count to every member with an open channel.
    fn broadcast_user_count(&self) {
        let envelope = ServerEnvelope::user_count(self.members.len());
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    error = %error,
                    "Failed to serialize user_count envelope"
                );
                return;
            }
        };

        for (member_id, member) in &self.members {
            if member.outbound.try_send(text.clone()).is_err() {
                self.metrics.record_peer_send_skipped();
                debug!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    member_id = %member_id,
                    "Skipping member with unavailable channel"
                );
            }
        }
    }

    /// Current room state.
    fn state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            member_count: self.members.len(),
            created_at: self.created_at,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_room(room_id: &str) -> (RoomHandle, JoinHandle<()>) {
        RoomActor::spawn(
            room_id.to_string(),
            CancellationToken::new(),
            RelayMetrics::new(),
        )
    }

    fn test_member() -> (Member, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let member_id = Uuid::new_v4();
        (Member::new(member_id, "test-room".to_string(), tx), rx)
    }

    fn update_envelope(payload: &str) -> ClientEnvelope {
        ClientEnvelope::parse(&format!(r#"{{"type":"update","payload":"{payload}"}}"#))
            .expect("envelope should parse")
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> String {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame should arrive")
            .expect("channel should be open")
    }

    #[tokio::test]
    async fn test_room_actor_spawn() {
        let (handle, _task) = test_room("room-spawn");

        assert_eq!(handle.room_id(), "room-spawn");
        let state = handle.state().await.unwrap();
        assert_eq!(state.member_count, 0);
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_join_broadcasts_count_to_joiner() {
        let (handle, _task) = test_room("room-join");
        let (member, mut rx) = test_member();

        handle.join(member).await.unwrap();

        let frame = recv_frame(&mut rx).await;
        assert_eq!(frame, r#"{"type":"user_count","count":1}"#);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_second_join_broadcasts_to_everyone() {
        let (handle, _task) = test_room("room-join-2");
        let (member_a, mut rx_a) = test_member();
        let (member_b, mut rx_b) = test_member();

        handle.join(member_a).await.unwrap();
        assert_eq!(recv_frame(&mut rx_a).await, r#"{"type":"user_count","count":1}"#);

        handle.join(member_b).await.unwrap();
        assert_eq!(recv_frame(&mut rx_a).await, r#"{"type":"user_count","count":2}"#);
        assert_eq!(recv_frame(&mut rx_b).await, r#"{"type":"user_count","count":2}"#);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_relay_excludes_sender() {
        let (handle, _task) = test_room("room-relay");
        let (member_a, mut rx_a) = test_member();
        let (member_b, mut rx_b) = test_member();
        let sender_id = member_a.member_id;

        handle.join(member_a).await.unwrap();
        handle.join(member_b).await.unwrap();

        // Drain the user_count frames.
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_b).await;

        let envelope = update_envelope("diagram-v2");
        handle.relay(sender_id, envelope.clone()).await.unwrap();

        // B receives the exact frame text; A receives nothing.
        assert_eq!(recv_frame(&mut rx_b).await, envelope.as_text());
        assert!(
            timeout(Duration::from_millis(100), rx_a.recv()).await.is_err(),
            "sender must not receive its own update"
        );

        handle.cancel();
    }

    #[tokio::test]
    async fn test_relay_ignores_non_update_envelopes() {
        let (handle, _task) = test_room("room-ignore");
        let (member_a, mut rx_a) = test_member();
        let (member_b, mut rx_b) = test_member();
        let sender_id = member_a.member_id;

        handle.join(member_a).await.unwrap();
        handle.join(member_b).await.unwrap();
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_b).await;

        let envelope = ClientEnvelope::parse(r#"{"type":"presence","cursor":[1,2]}"#).unwrap();
        handle.relay(sender_id, envelope).await.unwrap();

        assert!(
            timeout(Duration::from_millis(100), rx_b.recv()).await.is_err(),
            "non-update envelopes must not be forwarded"
        );

        handle.cancel();
    }

    #[tokio::test]
    async fn test_leave_broadcasts_decremented_count() {
        let (handle, _task) = test_room("room-leave");
        let (member_a, mut rx_a) = test_member();
        let (member_b, mut rx_b) = test_member();
        let leaver_id = member_b.member_id;

        handle.join(member_a).await.unwrap();
        handle.join(member_b).await.unwrap();
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_b).await;

        handle.leave(leaver_id).await.unwrap();

        assert_eq!(recv_frame(&mut rx_a).await, r#"{"type":"user_count","count":1}"#);
        let state = handle.state().await.unwrap();
        assert_eq!(state.member_count, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_leave_of_unknown_member_is_noop() {
        let (handle, _task) = test_room("room-leave-unknown");
        let (member, mut rx) = test_member();

        handle.join(member).await.unwrap();
        recv_frame(&mut rx).await;

        handle.leave(Uuid::new_v4()).await.unwrap();

        // No broadcast, and the member is still there.
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        assert_eq!(handle.state().await.unwrap().member_count, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_last_leave_closes_room_without_broadcast() {
        let metrics = RelayMetrics::new();
        let (handle, task) = RoomActor::spawn(
            "room-solo".to_string(),
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        let (member, mut rx) = test_member();
        let member_id = member.member_id;

        handle.join(member).await.unwrap();
        recv_frame(&mut rx).await;

        handle.leave(member_id).await.unwrap();

        // The actor exits, which closes the member channel with no further
        // frames.
        timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should exit")
            .expect("actor should not panic");
        assert!(recv_frame_closed(&mut rx).await);
        assert_eq!(metrics.room_count(), 0);
        assert_eq!(metrics.member_count(), 0);

        // Further operations report the room as closed.
        assert!(matches!(
            handle.leave(member_id).await,
            Err(RelayError::RoomClosed)
        ));
    }

    async fn recv_frame_closed(rx: &mut mpsc::Receiver<String>) -> bool {
        matches!(timeout(Duration::from_secs(1), rx.recv()).await, Ok(None))
    }

    #[tokio::test]
    async fn test_broadcast_skips_member_with_closed_channel() {
        let (handle, _task) = test_room("room-skip");
        let (member_a, mut rx_a) = test_member();
        let (member_b, mut rx_b) = test_member();
        let (member_c, rx_c) = test_member();
        let sender_id = member_a.member_id;

        handle.join(member_a).await.unwrap();
        handle.join(member_b).await.unwrap();
        handle.join(member_c).await.unwrap();
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_b).await;
        recv_frame(&mut rx_b).await;

        // C's connection dies without a leave.
        drop(rx_c);

        let envelope = update_envelope("still-flowing");
        handle.relay(sender_id, envelope.clone()).await.unwrap();

        // B still receives the update despite C's dead channel.
        assert_eq!(recv_frame(&mut rx_b).await, envelope.as_text());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_cancellation_drops_members() {
        let metrics = RelayMetrics::new();
        let (handle, task) = RoomActor::spawn(
            "room-cancel".to_string(),
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        let (member, mut rx) = test_member();

        handle.join(member).await.unwrap();
        recv_frame(&mut rx).await;

        handle.cancel();

        timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should exit")
            .expect("actor should not panic");
        // Member channel closes and the gauges are drained.
        assert!(recv_frame_closed(&mut rx).await);
        assert_eq!(metrics.member_count(), 0);
        assert_eq!(metrics.room_count(), 0);
    }
}
