//! Bodies of the HTTP collaborator endpoints.
//!
//! - `GET /chat/history/{conversation}` returns a JSON array of
//!   [`HistoryRecord`], oldest first.
//! - `GET /chat/onlinemembers/{conversation}` returns a [`PresenceResponse`].

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    aliases::{CountField, WireCount, WireMessage},
};

/// One stored message as returned by the history endpoint.
///
/// Older backends omit `id` and `username`; normalization into the session's
/// message model decides how to fill them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireMessage")]
pub struct HistoryRecord {
    /// Backend-assigned id, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender user id (`user` or `senderId`)
    pub user: String,
    /// Sender display name (`username` or `senderDisplayName`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Message text (`message` or `body`)
    pub message: String,
    /// Stored send time (ISO-8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl From<WireMessage> for HistoryRecord {
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

impl HistoryRecord {
    /// Decode a history response body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the body is not an array of records
    pub fn decode_list(body: &[u8]) -> Result<Vec<Self>> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Online-member count response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireCount")]
pub struct PresenceResponse {
    /// Number of members connected to the conversation stream (`online` or
    /// `count`)
    pub online: u32,
}

impl TryFrom<WireCount> for PresenceResponse {
    type Error = &'static str;

    fn try_from(wire: WireCount) -> std::result::Result<Self, Self::Error> {
        Ok(Self { online: wire.resolve(CountField::Online)? })
    }
}

impl PresenceResponse {
    /// Decode a presence response body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the body lacks a non-negative `online`
    pub fn decode(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn decodes_full_and_legacy_history_records() {
        let body = br#"[
            {"id":"1","user":"u1","username":"Alice","message":"hello","timestamp":"2024-01-01T00:00:00Z"},
            {"user":"u2","message":"legacy","timestamp":"2024-01-01T00:00:05"}
        ]"#;

        let records = HistoryRecord::decode_list(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some("1"));
        assert_eq!(records[0].username.as_deref(), Some("Alice"));
        assert_eq!(records[1].id, None);
        assert_eq!(records[1].username, None);
        assert_eq!(records[1].message, "legacy");
    }

    #[test]
    fn history_must_be_an_array() {
        assert!(matches!(
            HistoryRecord::decode_list(br#"{"detail":"boom"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn decodes_presence() {
        assert_eq!(PresenceResponse::decode(br#"{"online":4}"#).unwrap().online, 4);
        assert!(PresenceResponse::decode(br#"{"online":"four"}"#).is_err());
        assert_eq!(PresenceResponse::decode(br#"{"count":2}"#).unwrap().online, 2);
        assert_eq!(PresenceResponse::decode(br#"{"online":4,"count":2}"#).unwrap().online, 4);
        assert!(PresenceResponse::decode(b"{}").is_err());
    }

    #[test]
    fn records_with_both_spellings_decode() {
        let body = br#"[{"user":"u1","senderId":"u1","message":"hey","body":"hey","senderDisplayName":"Alice","timestamp":"2024-01-01T00:00:00Z"}]"#;

        let records = HistoryRecord::decode_list(body).unwrap();
        assert_eq!(records[0].user, "u1");
        assert_eq!(records[0].username.as_deref(), Some("Alice"));
        assert_eq!(records[0].message, "hey");
    }
}
