//! JSON frames exchanged over the conversation stream.
//!
//! Frames are internally tagged by a `type` discriminator. Inbound frames
//! accept both the current field names (`user`, `username`, `message`) and the
//! descriptive aliases some backend versions emit (`senderId`,
//! `senderDisplayName`, `body`), or both at once with the current name taking
//! precedence. Outbound frames always use the current names.
//!
//! # Invariants
//!
//! - A [`MessageFrame`] that passes [`MessageFrame::validate`] has a non-empty
//!   sender, a body of 1 to [`MAX_BODY_CHARS`] characters and a parseable
//!   timestamp.
//! - Unknown `type` values are decode errors, never silently ignored frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ProtocolError, Result,
    aliases::{CountField, WireCount, WireMessage},
    timestamp,
};

/// Maximum message body length in characters, matching the backend schema.
pub const MAX_BODY_CHARS: usize = 1000;

/// Check a message body against the backend constraints.
///
/// # Errors
///
/// - `ProtocolError::EmptyField` if the body is empty or whitespace only
/// - `ProtocolError::BodyTooLong` if it exceeds [`MAX_BODY_CHARS`]
pub fn validate_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(ProtocolError::EmptyField("message"));
    }

    let len = body.chars().count();
    if len > MAX_BODY_CHARS {
        return Err(ProtocolError::BodyTooLong { len, max: MAX_BODY_CHARS });
    }

    Ok(())
}

/// Frames received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// A chat message (including the echo of our own sends)
    Message(MessageFrame),
    /// Live online-member count
    Presence(PresenceFrame),
    /// Acknowledgement of our identify frame
    Identify(IdentifyAck),
}

impl InboundFrame {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the text is not JSON or has an unknown
    ///   or missing `type`
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Frame discriminator, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Presence(_) => "presence",
            Self::Identify(_) => "identify",
        }
    }
}

/// Chat message frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireMessage")]
pub struct MessageFrame {
    /// Backend-assigned id. Absent on legacy backends.
    pub id: Option<String>,
    /// Sender user id (`user` or `senderId`)
    pub user: String,
    /// Sender display name (`username` or `senderDisplayName`)
    pub username: Option<String>,
    /// Message text (`message` or `body`)
    pub message: String,
    /// Authoritative send time (ISO-8601)
    pub timestamp: Option<String>,
}

impl From<WireMessage> for MessageFrame {
    fn from(mut wire: WireMessage) -> Self {
        Self {
            user: wire.sender(),
            username: wire.display_name(),
            message: wire.text(),
            id: wire.id,
            timestamp: wire.timestamp,
        }
    }
}

impl MessageFrame {
    /// Check sender, body and timestamp.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EmptyField` for an empty sender or body
    /// - `ProtocolError::BodyTooLong` for an oversized body
    /// - `ProtocolError::MissingField` / `InvalidTimestamp` for a bad timestamp
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(ProtocolError::EmptyField("user"));
        }
        validate_body(&self.message)?;
        self.sent_at().map(|_| ())
    }

    /// Parsed timestamp.
    pub fn sent_at(&self) -> Result<DateTime<Utc>> {
        let raw = self.timestamp.as_deref().ok_or(ProtocolError::MissingField("timestamp"))?;
        timestamp::parse(raw)
    }

    /// Display name, falling back to the sender id when absent or blank.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.user,
        }
    }
}

/// Presence push frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireCount")]
pub struct PresenceFrame {
    /// Number of members currently connected (`count` or `online`)
    pub count: u32,
}

impl TryFrom<WireCount> for PresenceFrame {
    type Error = &'static str;

    fn try_from(wire: WireCount) -> std::result::Result<Self, Self::Error> {
        Ok(Self { count: wire.resolve(CountField::Count)? })
    }
}

/// Identify acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct IdentifyAck {
    /// Echoed user id, if the backend includes it
    #[serde(default)]
    pub user: Option<String>,
}

/// Frames sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Announce who is on this stream. Sent once per opened stream.
    Identify {
        /// Sender user id
        user: String,
        /// Sender display name
        username: String,
    },
    /// User message
    Message {
        /// Sender user id
        user: String,
        /// Sender display name
        username: String,
        /// Message text
        message: String,
        /// Client clock at send time. Advisory only; the echo carries the
        /// authoritative value.
        timestamp: String,
    },
}

impl OutboundFrame {
    /// Build an identify frame.
    pub fn identify(user: impl Into<String>, username: impl Into<String>) -> Self {
        Self::Identify { user: user.into(), username: username.into() }
    }

    /// Build a message frame stamped with the client clock.
    pub fn message(
        user: impl Into<String>,
        username: impl Into<String>,
        body: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self::Message {
            user: user.into(),
            username: username.into(),
            message: body.into(),
            timestamp: timestamp::format(issued_at),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
