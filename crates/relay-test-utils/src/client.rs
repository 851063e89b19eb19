//! WebSocket client helpers for end-to-end tests.

use anyhow::{bail, Context};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Default wait for an expected frame.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A test WebSocket client wrapping `tokio-tungstenite`.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect to a relay room URL (e.g. `ws://127.0.0.1:PORT/alpha`).
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        Ok(Self { stream })
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .context("failed to send frame")?;
        Ok(())
    }

    /// Receive the next text frame and parse it as JSON, skipping
    /// ping/pong control frames. Fails after [`RECV_TIMEOUT`].
    pub async fn recv_json(&mut self) -> Result<serde_json::Value, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .context("timed out waiting for a frame")?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .with_context(|| format!("frame is not JSON: {text}"));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(other)) => bail!("unexpected frame: {other:?}"),
                Some(Err(e)) => return Err(e).context("transport error"),
            }
        }
    }

    /// Receive the next frame and assert it is `user_count` with the given
    /// count.
    pub async fn expect_user_count(&mut self, expected: u64) -> Result<(), anyhow::Error> {
        let value = self.recv_json().await?;
        let message_type = value.get("type").and_then(serde_json::Value::as_str);
        let count = value.get("count").and_then(serde_json::Value::as_u64);

        if message_type != Some("user_count") || count != Some(expected) {
            bail!("expected user_count {expected}, got {value}");
        }
        Ok(())
    }

    /// Assert that no data frame arrives within the given window.
    /// Ping/pong control traffic is ignored.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Err(_) => return Ok(()),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                Ok(Some(Ok(frame))) => bail!("expected silence, got frame: {frame:?}"),
                Ok(Some(Err(e))) => return Err(e).context("transport error"),
                Ok(None) => bail!("connection closed during silence window"),
            }
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_close(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                bail!("connection was not closed within {window:?}");
            }
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Err(_) => bail!("connection was not closed within {window:?}"),
                Ok(Some(Ok(Message::Close(_))) | None) => return Ok(()),
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(_))) => return Ok(()),
            }
        }
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream
            .close(None)
            .await
            .context("failed to close connection")?;
        Ok(())
    }
}
