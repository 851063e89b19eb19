//! Wire envelopes exchanged with clients.
//!
//! Every frame is a JSON object tagged by a `type` field. The relay only
//! interprets two values: `"update"` (client-originated, payload forwarded
//! verbatim to the rest of the room) and `"user_count"` (server-originated,
//! pushed after every membership change). Any other tag parses successfully
//! and is ignored, which keeps the protocol forward compatible.

use serde::Serialize;
use thiserror::Error;

/// Envelope tag for client state updates.
pub const UPDATE_TYPE: &str = "update";

/// Envelope tag for server-generated member-count pushes.
pub const USER_COUNT_TYPE: &str = "user_count";

/// A parsed inbound frame.
///
/// The original text is retained so that `"update"` payloads are relayed to
/// peers byte-for-byte, whatever extra fields the client attached.
#[derive(Debug, Clone)]
pub struct ClientEnvelope {
    message_type: String,
    text: String,
}

impl ClientEnvelope {
    /// Parse a text frame into an envelope.
    ///
    /// Accepts any JSON object carrying a string `type` field. The payload
    /// itself is not validated; the relay treats it as opaque.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(EnvelopeError::NotAnObject)?;
        let message_type = object
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(EnvelopeError::MissingType)?
            .to_string();

        Ok(Self {
            message_type,
            text: text.to_string(),
        })
    }

    /// The envelope's `type` tag.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Whether this envelope should be forwarded to the sender's peers.
    #[must_use]
    pub fn is_update(&self) -> bool {
        self.message_type == UPDATE_TYPE
    }

    /// The original frame text.
    #[must_use]
    pub fn as_text(&self) -> &str {
        &self.text
    }

    /// Consume the envelope, yielding the original frame text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// A server-generated outbound frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Current member count of a room, pushed after every join and leave.
    UserCount { count: usize },
}

impl ServerEnvelope {
    /// Build a `user_count` envelope.
    #[must_use]
    pub fn user_count(count: usize) -> Self {
        ServerEnvelope::UserCount { count }
    }

    /// Serialize to frame text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why an inbound frame was rejected.
///
/// Rejected frames are logged and dropped; the connection stays open.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,

    /// The object has no string `type` field.
    #[error("envelope is missing a string \"type\" field")]
    MissingType,
}
