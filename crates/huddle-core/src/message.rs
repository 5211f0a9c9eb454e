//! Normalized chat message model.
//!
//! Live frames and history records arrive in slightly different shapes; both
//! are normalized into [`Message`] before they reach the store. Identity for
//! deduplication is [`MessageId`]: the backend id when present, otherwise a
//! hash over sender, authoritative timestamp and body.

use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, Utc};
use huddle_proto::{HistoryRecord, MessageFrame, ProtocolError, timestamp, validate_body};

use crate::context::{ConversationId, Identity};

/// Unique key of a message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Id assigned by the backend
    Server(String),
    /// Derived from (sender, sent_at, body) when the backend sent no id
    Composite(u64),
    /// Locally generated notice, keyed by a fixed tag
    System(&'static str),
}

impl MessageId {
    /// Key for a message without a backend id.
    pub fn composite(sender_id: &str, sent_at: DateTime<Utc>, body: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        sender_id.hash(&mut hasher);
        sent_at.timestamp_millis().hash(&mut hasher);
        body.hash(&mut hasher);
        Self::Composite(hasher.finish())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Composite(hash) => write!(f, "composite:{hash:016x}"),
            Self::System(tag) => write!(f, "system:{tag}"),
        }
    }
}

/// A chat message as the session stores and renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Deduplication key
    pub id: MessageId,
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Sender user id. Empty for system notices.
    pub sender_id: String,
    /// Sender display name
    pub sender_display_name: String,
    /// Text, 1 to 1000 characters
    pub body: String,
    /// Authoritative send time
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Normalize a live message frame.
    ///
    /// # Errors
    ///
    /// - any [`ProtocolError`] from validation (empty sender or body, body too
    ///   long, missing or unparseable timestamp)
    pub fn from_frame(
        conversation_id: &ConversationId,
        frame: &MessageFrame,
    ) -> Result<Self, ProtocolError> {
        frame.validate()?;
        let sent_at = frame.sent_at()?;
        Ok(Self::build(
            conversation_id,
            frame.id.as_deref(),
            &frame.user,
            frame.display_name(),
            &frame.message,
            sent_at,
        ))
    }

    /// Normalize a history record.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EmptyField` for an empty sender or body
    /// - `ProtocolError::BodyTooLong` for an oversized body
    /// - `ProtocolError::MissingField` / `InvalidTimestamp` for a bad timestamp
    pub fn from_record(
        conversation_id: &ConversationId,
        record: &HistoryRecord,
    ) -> Result<Self, ProtocolError> {
        if record.user.trim().is_empty() {
            return Err(ProtocolError::EmptyField("user"));
        }
        validate_body(&record.message)?;
        let raw = record.timestamp.as_deref().ok_or(ProtocolError::MissingField("timestamp"))?;
        let sent_at = timestamp::parse(raw)?;

        let display_name = match record.username.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &record.user,
        };

        Ok(Self::build(
            conversation_id,
            record.id.as_deref(),
            &record.user,
            display_name,
            &record.message,
            sent_at,
        ))
    }

    /// Locally generated notice (not from any sender).
    pub fn system(
        conversation_id: &ConversationId,
        tag: &'static str,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::System(tag),
            conversation_id: conversation_id.clone(),
            sender_id: String::new(),
            sender_display_name: "system".to_string(),
            body: body.into(),
            sent_at: at,
        }
    }

    fn build(
        conversation_id: &ConversationId,
        id: Option<&str>,
        sender_id: &str,
        display_name: &str,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => MessageId::Server(id.to_string()),
            _ => MessageId::composite(sender_id, sent_at, body),
        };

        Self {
            id,
            conversation_id: conversation_id.clone(),
            sender_id: sender_id.to_string(),
            sender_display_name: display_name.to_string(),
            body: body.to_string(),
            sent_at,
        }
    }

    /// Sent by the local user. Derived, never stored.
    pub fn is_self(&self, identity: &Identity) -> bool {
        !self.is_system() && self.sender_id == identity.user_id
    }

    /// Locally generated notice.
    pub fn is_system(&self) -> bool {
        matches!(self.id, MessageId::System(_))
    }
}
