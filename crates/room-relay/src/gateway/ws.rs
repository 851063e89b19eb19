//! Connection gateway: WebSocket upgrade and per-connection pumps.
//!
//! The gateway is a thin accept/upgrade layer in front of the actor system:
//!
//! - `GET /` (no room identifier) is refused with `400 Bad Request`
//! - `GET /<anything>` upgrades to a WebSocket; the raw path remainder -
//!   verbatim, percent-escapes and all - becomes the room id
//! - each upgraded socket gets one writer task (drains the member's outbound
//!   channel) and one read loop (parses frames, forwards to the room actor)
//!
//! Dead connections are reaped by heartbeat: the writer pings on an
//! interval, and the read loop drops the connection when the last pong is
//! older than the configured cutoff. The room actor dropping this member's
//! channel (room cancelled at shutdown) ends the writer, which closes the
//! socket from our side.

use crate::actors::messages::Member;
use crate::actors::metrics::RelayMetrics;
use crate::actors::registry::RegistryHandle;
use crate::actors::room::RoomHandle;
use crate::config::Config;
use crate::protocol::ClientEnvelope;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Buffer size for each member's outbound frame channel. Broadcasts
/// `try_send` into this channel, so the buffer is also the slow-consumer
/// allowance before frames are skipped.
const MEMBER_OUTBOUND_BUFFER: usize = 256;

/// Heartbeat timings for dead-connection reaping.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often to ping each connection; `None` disables reaping.
    pub ping_interval: Option<Duration>,
    /// Cutoff after which a connection with no pong is dropped.
    pub pong_timeout: Duration,
}

impl HeartbeatConfig {
    /// Derive heartbeat timings from the service configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ping_interval: (config.ping_interval_seconds > 0)
                .then(|| Duration::from_secs(config.ping_interval_seconds)),
            pong_timeout: Duration::from_secs(config.pong_timeout_seconds),
        }
    }

    /// Heartbeat reaping disabled; idle connections live until the
    /// transport reports closure.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            ping_interval: None,
            pong_timeout: Duration::from_secs(crate::config::DEFAULT_PONG_TIMEOUT_SECONDS),
        }
    }
}

/// Shared state for the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    /// Handle to the room registry.
    pub registry: RegistryHandle,
    /// Shared relay metrics.
    pub metrics: Arc<RelayMetrics>,
    /// Heartbeat timings.
    pub heartbeat: HeartbeatConfig,
}

/// Create the WebSocket router.
///
/// `/` is routed explicitly so that an upgrade attempt with no room
/// identifier is refused before any upgrade handshake happens.
pub fn ws_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(reject_missing_room))
        .route("/*room", get(ws_handler))
        .with_state(state)
}

/// Refuse a connection attempt with no room identifier.
async fn reject_missing_room() -> StatusCode {
    warn!(
        target: "relay.gateway",
        "Refusing connection with no room identifier"
    );
    StatusCode::BAD_REQUEST
}

/// Upgrade handler for `GET /<roomId>`.
///
/// The room id is taken from the raw request path, not a decoded capture,
/// so `room%20with%20spaces` joins exactly that room.
async fn ws_handler(
    ws: WebSocketUpgrade,
    uri: Uri,
    State(state): State<GatewayState>,
) -> Response {
    let Some(room_id) = room_id_from_path(uri.path()) else {
        return reject_missing_room().await.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
        .into_response()
}

/// Extract the room id: the path remainder after the leading slash,
/// verbatim. Empty remainder means a malformed request.
fn room_id_from_path(path: &str) -> Option<String> {
    let remainder = path.strip_prefix('/').unwrap_or(path);
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

/// Drive one upgraded connection for its whole lifetime.
async fn handle_socket(mut socket: WebSocket, room_id: String, state: GatewayState) {
    let member_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel(MEMBER_OUTBOUND_BUFFER);
    let member = Member::new(member_id, room_id.clone(), outbound_tx);

    let room = match state.registry.join(room_id.clone(), member).await {
        Ok(room) => room,
        Err(error) => {
            warn!(
                target: "relay.gateway",
                room_id = %room_id,
                member_id = %member_id,
                error = %error,
                "Closing connection refused by registry"
            );
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    debug!(
        target: "relay.gateway",
        room_id = %room_id,
        member_id = %member_id,
        "Member connected"
    );

    let (ws_sender, ws_receiver) = socket.split();
    let mut writer_task = tokio::spawn(write_outbound(
        ws_sender,
        outbound_rx,
        state.heartbeat.ping_interval,
    ));

    read_inbound(ws_receiver, &room, member_id, &state, &mut writer_task).await;

    // Same cleanup path for graceful close, transport error, and heartbeat
    // timeout. A vanished room makes the leave a no-op.
    let _ = room.leave(member_id).await;
    writer_task.abort();

    debug!(
        target: "relay.gateway",
        room_id = %room.room_id(),
        member_id = %member_id,
        "Member disconnected"
    );
}

/// Read loop: parse inbound frames, forward envelopes, watch liveness.
async fn read_inbound(
    mut ws_receiver: SplitStream<WebSocket>,
    room: &RoomHandle,
    member_id: Uuid,
    state: &GatewayState,
    writer_task: &mut tokio::task::JoinHandle<()>,
) {
    let mut liveness_timer = heartbeat_timer(state.heartbeat.ping_interval);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match ClientEnvelope::parse(&text) {
                    Ok(envelope) => {
                        if room.relay(member_id, envelope).await.is_err() {
                            // Room vanished between arrival and processing.
                            debug!(
                                target: "relay.gateway",
                                room_id = %room.room_id(),
                                member_id = %member_id,
                                "Dropping message for vanished room"
                            );
                        }
                    }
                    Err(error) => {
                        state.metrics.record_dropped_frame();
                        warn!(
                            target: "relay.gateway",
                            room_id = %room.room_id(),
                            member_id = %member_id,
                            error = %error,
                            "Dropping unparsable message"
                        );
                    }
                },
                Some(Ok(Message::Pong(_))) => {
                    last_pong = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by the protocol layer; binary frames
                // are not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(
                        target: "relay.gateway",
                        room_id = %room.room_id(),
                        member_id = %member_id,
                        error = %error,
                        "Transport error, closing connection"
                    );
                    break;
                }
            },

            // Writer finished: the room dropped this member's channel or
            // the socket's write half died.
            _ = &mut *writer_task => break,

            () = tick_or_pending(&mut liveness_timer) => {
                if last_pong.elapsed() > state.heartbeat.pong_timeout {
                    warn!(
                        target: "relay.gateway",
                        room_id = %room.room_id(),
                        member_id = %member_id,
                        "Heartbeat timed out, dropping connection"
                    );
                    break;
                }
            }
        }
    }
}

/// Writer task: drain the member's outbound channel into the socket and
/// ping on the heartbeat interval.
async fn write_outbound(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    ping_interval: Option<Duration>,
) {
    let mut ping_timer = heartbeat_timer(ping_interval);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => {
                    // The room dropped this member; close the socket politely.
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },

            () = tick_or_pending(&mut ping_timer) => {
                if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Build an optional heartbeat interval timer.
fn heartbeat_timer(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    })
}

/// Tick the timer, or park forever when heartbeating is disabled.
async fn tick_or_pending(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
