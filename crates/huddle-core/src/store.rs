//! Append-only, deduplicated message log.
//!
//! Readers get cheap immutable snapshots ([`Snapshot`]); a merge swaps in a
//! new version only when the log actually changes, so a snapshot taken before
//! a merge never observes it.
//!
//! # Invariants
//!
//! - No two entries share a [`MessageId`].
//! - Entries are never reordered or removed, only appended (until
//!   [`MessageStore::clear`] on conversation change).
//! - Merge is idempotent: merging a message already present is a no-op.

use std::{collections::HashSet, sync::Arc};

use crate::message::{Message, MessageId};

/// Immutable view of the log, oldest first.
pub type Snapshot = Arc<Vec<Message>>;

/// Ordered message log for one conversation.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Snapshot,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` unless its id is already present.
    ///
    /// Returns `true` if the log grew.
    pub fn merge(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        Arc::make_mut(&mut self.entries).push(message);
        true
    }

    /// Current log. Cheap: shares storage until the next merge.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries)
    }

    /// Whether a message with this id has been merged.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No messages yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// Drop everything (conversation switch or teardown).
    pub fn clear(&mut self) {
        self.entries = Snapshot::default();
        self.ids.clear();
    }
}
