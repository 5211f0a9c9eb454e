//! Session inputs and outputs.
//!
//! [`SessionEvent`] is everything that drives a [`crate::ChatSession`]: view
//! intents, transport outcomes, collaborator results and timer ticks.
//! [`SessionAction`] is everything it asks the driver to do, plus
//! [`SessionUpdate`] notifications for whoever renders the session.

use chrono::{DateTime, Utc};
use huddle_proto::{CloseCode, OutboundFrame};

use crate::{
    connection::ConnectionState,
    context::{ConversationId, Identity, ResolvedSession},
    history::HistoryError,
    message::Message,
    presence::PresenceError,
};

/// Events processed by the session.
#[derive(Debug, Clone)]
pub enum SessionEvent<I> {
    /// Identity became known (or changed).
    IdentityResolved(Identity),

    /// Identity was lost (sign-out).
    IdentityCleared,

    /// The view selected a conversation.
    ConversationSelected(ConversationId),

    /// The view went away.
    Teardown,

    /// Manual retry after a failure or server-side close.
    Retry,

    /// The user submitted a message.
    SendMessage {
        /// Raw text as typed
        body: String,
    },

    /// The stream of `generation` opened.
    TransportOpened {
        /// Generation from the `Connect` action
        generation: u64,
    },

    /// A text frame arrived on the stream of `generation`.
    FrameReceived {
        /// Stream generation
        generation: u64,
        /// Raw frame text
        text: String,
    },

    /// The stream of `generation` closed or failed to open.
    TransportClosed {
        /// Stream generation
        generation: u64,
        /// Closure code (1006 for drops without a close frame)
        code: CloseCode,
        /// Closure reason, if any
        reason: Option<String>,
    },

    /// A history read issued in `epoch` completed.
    HistoryLoaded {
        /// Epoch from the `FetchHistory` action
        epoch: u64,
        /// Normalized messages or the failure
        result: Result<Vec<Message>, HistoryError>,
    },

    /// A presence read issued in `epoch` completed.
    PresenceFetched {
        /// Epoch from the `FetchPresence` action
        epoch: u64,
        /// Online count or the failure
        result: Result<u32, PresenceError>,
    },

    /// Timer tick.
    Tick {
        /// Current time
        now: I,
    },
}

/// Actions produced by the session for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a stream; report the outcome under `generation`.
    Connect {
        /// Stream generation
        generation: u64,
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// Send a frame on the stream of `generation`.
    SendFrame {
        /// Stream generation
        generation: u64,
        /// Frame to send
        frame: OutboundFrame,
    },

    /// Close the stream of `generation` with a close frame.
    CloseTransport {
        /// Stream generation
        generation: u64,
        /// Close code
        code: CloseCode,
        /// Close reason
        reason: String,
    },

    /// Drop the stream of `generation` without a close handshake.
    AbortTransport {
        /// Stream generation
        generation: u64,
    },

    /// Load history; report the result under `epoch`.
    FetchHistory {
        /// Session epoch
        epoch: u64,
        /// Who is asking, and for which conversation
        target: ResolvedSession,
    },

    /// Read the online count; report the result under `epoch`.
    FetchPresence {
        /// Session epoch
        epoch: u64,
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// Something observable changed.
    Notify(SessionUpdate),
}

/// Observable changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Connection state changed.
    Connection(ConnectionState),

    /// A message was appended to the log.
    MessageAppended(Message),

    /// The online count changed.
    Presence(u32),

    /// A send was issued and awaits its echo.
    Sending(PendingMessage),

    /// The echo of a pending send arrived.
    Delivered {
        /// Local id of the pending entry
        local_id: u64,
    },

    /// A pending send was dropped because its stream closed first.
    SendAbandoned {
        /// Local id of the pending entry
        local_id: u64,
    },

    /// History could not be loaded; a notice was shown instead.
    HistoryUnavailable {
        /// Failure description
        reason: String,
    },

    /// Reconnecting stopped.
    RetryExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Open is waiting for the identity or conversation.
    AwaitingIdentity,
}

/// A send issued but not yet echoed.
///
/// Lives only in the view; it never enters the message log. The echo, not
/// this placeholder, is the authoritative message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Random local id
    pub local_id: u64,
    /// Trimmed text as sent
    pub body: String,
    /// Client clock at send time
    pub issued_at: DateTime<Utc>,
}
