//! Online-member count.
//!
//! The count has two sources: pushes on the open stream and one-shot reads
//! from the HTTP collaborator ([`PresenceSource`]). Whichever arrives last
//! wins. While no stream is open the count is 0. Optional polling re-reads
//! the count on a fixed interval while the stream is open.

use std::{future::Future, ops::Add, time::Duration};

use thiserror::Error;

use crate::context::ConversationId;

/// Presence read failure. Never fatal: the last known count is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// Request failed or the response was unusable
    #[error("presence unavailable: {0}")]
    Unavailable(String),
}

/// One-shot read of the online count.
pub trait PresenceSource: Send + Sync {
    /// Current number of members connected to `conversation_id`.
    fn online_count(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<u32, PresenceError>> + Send;
}

/// Where the current count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSourceKind {
    /// Pushed on the stream
    Push,
    /// Read from the collaborator
    Refresh,
}

/// Tracks the online count and the optional poll schedule.
#[derive(Debug, Clone)]
pub struct PresenceTracker<I> {
    count: u32,
    source: Option<PresenceSourceKind>,
    poll_interval: Option<Duration>,
    next_poll: Option<I>,
}

impl<I> Default for PresenceTracker<I> {
    fn default() -> Self {
        Self { count: 0, source: None, poll_interval: None, next_poll: None }
    }
}

impl<I> PresenceTracker<I> {
    /// Current count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Source of the current count. `None` after a reset.
    pub fn source(&self) -> Option<PresenceSourceKind> {
        self.source
    }
}

impl<I> PresenceTracker<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Tracker starting at 0, polling every `poll_interval` while open.
    pub fn new(poll_interval: Option<Duration>) -> Self {
        Self { count: 0, source: None, poll_interval, next_poll: None }
    }

    /// Apply a pushed count. Returns `true` if the count changed.
    pub fn on_push(&mut self, count: u32) -> bool {
        self.apply(count, PresenceSourceKind::Push)
    }

    /// Apply a fetched count. Returns `true` if the count changed.
    pub fn on_refresh(&mut self, count: u32) -> bool {
        self.apply(count, PresenceSourceKind::Refresh)
    }

    fn apply(&mut self, count: u32, source: PresenceSourceKind) -> bool {
        self.source = Some(source);
        let changed = self.count != count;
        self.count = count;
        changed
    }

    /// Back to 0 (stream closed). Returns `true` if the count changed.
    pub fn reset(&mut self) -> bool {
        self.source = None;
        self.next_poll = None;
        let changed = self.count != 0;
        self.count = 0;
        changed
    }

    /// Start the poll schedule (stream opened). No-op without an interval.
    pub fn start_polling(&mut self, now: I) {
        self.next_poll = self.poll_interval.map(|interval| now + interval);
    }

    /// Whether a poll is due at `now`. Reschedules the next one if so.
    pub fn poll_due(&mut self, now: I) -> bool {
        match (self.next_poll, self.poll_interval) {
            (Some(at), Some(interval)) if at <= now => {
                self.next_poll = Some(now + interval);
                true
            },
            _ => false,
        }
    }

    /// Next poll time, if polling.
    pub fn next_deadline(&self) -> Option<I> {
        self.next_poll
    }
}
