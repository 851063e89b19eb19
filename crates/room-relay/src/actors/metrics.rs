//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with configurable thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Registry   | < 100  | 100-500 | > 500    |
//! | Room       | < 100  | 100-500 | > 500    |
//!
//! Aggregate counters are exported with the `relay_` prefix via the
//! Prometheus recorder installed in `main`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds shared by registry and room actors.
pub const MAILBOX_NORMAL: usize = 100;
pub const MAILBOX_WARNING: usize = 500;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `RoomRegistryActor` (singleton).
    Registry,
    /// `RoomActor` (one per live room).
    Room,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Room => "room",
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (relay_id or room_id).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Peak mailbox depth since creation.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        // Update peak if necessary
        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        let level = self.level_for_depth(new_depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "relay.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = MAILBOX_WARNING,
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning && new_depth == MAILBOX_NORMAL + 1 {
            // Log once when crossing the warning threshold
            debug!(
                target: "relay.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message being removed from the mailbox (processed).
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    /// Determine mailbox level for a given depth.
    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the relay.
///
/// Shared between the actor system (which updates values) and the
/// readiness/status surfaces (which read them). All fields are atomic for
/// lock-free concurrent access; each update is mirrored to the Prometheus
/// recorder.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Rooms currently live.
    active_rooms: AtomicUsize,
    /// Members currently connected across all rooms.
    active_members: AtomicUsize,
    /// Update envelopes relayed to peers.
    relayed_updates: AtomicU64,
    /// Peer sends skipped because the member channel was closed or full.
    skipped_peer_sends: AtomicU64,
    /// Inbound frames dropped as unparsable.
    dropped_frames: AtomicU64,
    /// Actor panics (indicates bugs).
    actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    total_messages_processed: AtomicU64,
}

/// Snapshot of relay metrics at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct RelayMetricsSnapshot {
    /// Rooms currently live.
    pub rooms: usize,
    /// Members currently connected.
    pub members: usize,
    /// Update envelopes relayed to peers.
    pub relayed_updates: u64,
    /// Peer sends skipped during broadcast.
    pub skipped_peer_sends: u64,
    /// Inbound frames dropped as unparsable.
    pub dropped_frames: u64,
}

impl RelayMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a room actor starting.
    pub fn room_opened(&self) {
        self.active_rooms.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("relay_active_rooms").increment(1.0);
    }

    /// Record a room actor exiting.
    pub fn room_closed(&self) {
        self.active_rooms.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("relay_active_rooms").decrement(1.0);
    }

    /// Record a member joining a room.
    pub fn member_joined(&self) {
        self.active_members.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("relay_active_members").increment(1.0);
    }

    /// Record a member leaving a room.
    pub fn member_left(&self) {
        self.active_members.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("relay_active_members").decrement(1.0);
    }

    /// Record an update envelope being relayed to a room.
    pub fn record_update_relayed(&self) {
        self.relayed_updates.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_updates_relayed_total").increment(1);
    }

    /// Record a peer send skipped during broadcast.
    pub fn record_peer_send_skipped(&self) {
        self.skipped_peer_sends.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_peer_sends_skipped_total").increment(1);
    }

    /// Record an inbound frame dropped as unparsable.
    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_frames_dropped_total").increment(1);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            target: "relay.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    /// Record a message being processed by an actor.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get current room count.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::SeqCst)
    }

    /// Get current member count.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.active_members.load(Ordering::SeqCst)
    }

    /// Take a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            rooms: self.active_rooms.load(Ordering::SeqCst),
            members: self.active_members.load(Ordering::SeqCst),
            relayed_updates: self.relayed_updates.load(Ordering::Relaxed),
            skipped_peer_sends: self.skipped_peer_sends.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}
