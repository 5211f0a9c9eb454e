//! Raw decode shapes for fields that have two spellings on the wire.
//!
//! Some backend versions send the descriptive names (`senderId`,
//! `senderDisplayName`, `body`), some the current ones, and some both. The
//! current name wins when it is present and not blank.

use serde::Deserialize;

/// Message fields as they appear in frames and history records.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, rename = "senderId")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "senderDisplayName")]
    pub sender_display_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl WireMessage {
    pub fn sender(&mut self) -> String {
        pick(self.user.take(), self.sender_id.take()).unwrap_or_default()
    }

    pub fn display_name(&mut self) -> Option<String> {
        pick(self.username.take(), self.sender_display_name.take())
    }

    pub fn text(&mut self) -> String {
        pick(self.message.take(), self.body.take()).unwrap_or_default()
    }
}

/// Online count under `count` or `online`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireCount {
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    online: Option<u32>,
}

impl WireCount {
    /// The count, preferring `preferred` when both are sent.
    pub fn resolve(self, preferred: CountField) -> Result<u32, &'static str> {
        let (first, second) = match preferred {
            CountField::Count => (self.count, self.online),
            CountField::Online => (self.online, self.count),
        };
        first.or(second).ok_or("missing field `count` or `online`")
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CountField {
    Count,
    Online,
}

fn pick(current: Option<String>, alias: Option<String>) -> Option<String> {
    match (current, alias) {
        (Some(current), _) if !current.trim().is_empty() => Some(current),
        (current, Some(alias)) if !alias.trim().is_empty() => Some(alias),
        (current, alias) => current.or(alias),
    }
}
