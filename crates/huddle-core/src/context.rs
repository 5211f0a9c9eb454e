//! Who is chatting, and where.
//!
//! The identity comes from an external auth/profile source and may be unknown
//! for a while; the conversation comes from the view. Nothing connects until
//! both are known, see [`SessionContext::resolved`].

use std::fmt;

/// Opaque, non-empty conversation (group) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a raw id. Returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == raw.len() { Some(Self(raw)) } else { Some(Self(trimmed.to_string())) }
    }

    /// Raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConversationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The local user as announced to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Stable user id, compared against message senders
    pub user_id: String,
    /// Name shown next to messages
    pub display_name: String,
}

impl Identity {
    /// Build an identity. Leading and trailing whitespace is dropped.
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into().trim().to_string(),
            display_name: display_name.into().trim().to_string(),
        }
    }

    /// Both fields are present.
    pub fn is_resolved(&self) -> bool {
        !self.user_id.is_empty() && !self.display_name.is_empty()
    }
}

/// Identity and conversation, both known. Everything the connection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// Local user
    pub identity: Identity,
    /// Target conversation
    pub conversation_id: ConversationId,
}

/// Mutable session inputs, possibly incomplete.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    identity: Option<Identity>,
    conversation_id: Option<ConversationId>,
}

impl SessionContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity. Returns `true` if it changed.
    ///
    /// An identity with an empty field counts as unresolved.
    pub fn set_identity(&mut self, identity: Identity) -> bool {
        let next = identity.is_resolved().then_some(identity);
        if next == self.identity {
            return false;
        }
        self.identity = next;
        true
    }

    /// Forget the identity (sign-out). Returns `true` if one was set.
    pub fn clear_identity(&mut self) -> bool {
        self.identity.take().is_some()
    }

    /// Select a conversation. Returns `true` if it changed.
    pub fn select_conversation(&mut self, conversation_id: ConversationId) -> bool {
        if self.conversation_id.as_ref() == Some(&conversation_id) {
            return false;
        }
        self.conversation_id = Some(conversation_id);
        true
    }

    /// Leave the conversation (view gone). Returns `true` if one was set.
    pub fn clear_conversation(&mut self) -> bool {
        self.conversation_id.take().is_some()
    }

    /// Current identity, if resolved.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Current conversation, if selected.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Identity and conversation, if both are known.
    pub fn resolved(&self) -> Option<ResolvedSession> {
        Some(ResolvedSession {
            identity: self.identity.clone()?,
            conversation_id: self.conversation_id.clone()?,
        })
    }
}
