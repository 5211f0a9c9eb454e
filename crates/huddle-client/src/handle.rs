//! Caller-facing side of a running session.

use std::{fmt, sync::Arc};

use huddle_core::{
    ConnectionState, ConversationId, HistoryStatus, Identity, Message, PendingMessage,
    SessionError, Snapshot,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::ClientError;

/// Requests from a [`SessionHandle`] to the runtime.
#[derive(Debug)]
pub(crate) enum Command {
    SetIdentity(Identity),
    ClearIdentity,
    SelectConversation(ConversationId),
    Send { body: String, reply: oneshot::Sender<Result<(), SessionError>> },
    Retry,
    Teardown,
    DismissBanner,
    Shutdown,
}

/// Dismissible notice shown above the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    /// History failed to load
    HistoryUnavailable,
    /// Reconnecting stopped after this many attempts
    ConnectionFailed {
        /// Attempts made
        attempts: u32,
    },
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoryUnavailable => f.write_str(huddle_core::history::HISTORY_UNAVAILABLE_TEXT),
            Self::ConnectionFailed { attempts } => {
                write!(f, "Connection failed after {attempts} attempts. Retry to reconnect.")
            },
        }
    }
}

/// Everything a view needs to render the session.
#[derive(Debug, Clone)]
pub struct SessionView {
    /// Connection state
    pub state: ConnectionState,
    /// Message log in display order
    pub messages: Snapshot,
    /// Online count (0 unless connected)
    pub presence: u32,
    /// Sends awaiting their echo
    pub pending: Vec<PendingMessage>,
    /// Initial history load progress
    pub history: HistoryStatus,
    /// Notice to show, if any
    pub banner: Option<Banner>,
    /// Resolved identity
    pub identity: Option<Identity>,
    /// Selected conversation
    pub conversation_id: Option<ConversationId>,
    /// Reconnect ceiling, for "attempt n of m" displays
    pub max_attempts: u32,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            messages: Arc::new(Vec::new()),
            presence: 0,
            pending: Vec::new(),
            history: HistoryStatus::NotRequested,
            banner: None,
            identity: None,
            conversation_id: None,
            max_attempts: 0,
        }
    }
}

impl SessionView {
    /// Whether `message` was sent by the resolved identity.
    pub fn is_self(&self, message: &Message) -> bool {
        self.identity.as_ref().is_some_and(|identity| message.is_self(identity))
    }

    /// Short connection status for a header line.
    pub fn status_line(&self) -> String {
        match &self.state {
            ConnectionState::Idle => "Idle".to_string(),
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Open => format!("Connected, {} online", self.presence),
            ConnectionState::Closed { .. } => "Disconnected".to_string(),
            ConnectionState::Reconnecting { attempt } => {
                format!("Reconnecting ({attempt}/{})", self.max_attempts)
            },
            ConnectionState::Failed { .. } => "Connection failed".to_string(),
        }
    }

    /// Whether the view should accept a send.
    pub fn can_send(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
            && self.state == other.state
            && self.presence == other.presence
            && self.pending == other.pending
            && self.history == other.history
            && self.banner == other.banner
            && self.identity == other.identity
            && self.conversation_id == other.conversation_id
            && self.max_attempts == other.max_attempts
    }
}

/// Cloneable handle to a running session.
///
/// Dropping every handle shuts the runtime down, which tears the session
/// down first.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, view: watch::Receiver<SessionView>) -> Self {
        Self { commands, view }
    }

    /// Resolve (or change) the local identity.
    pub async fn set_identity(&self, identity: Identity) -> Result<(), ClientError> {
        self.command(Command::SetIdentity(identity)).await
    }

    /// Forget the local identity; the stream closes.
    pub async fn clear_identity(&self) -> Result<(), ClientError> {
        self.command(Command::ClearIdentity).await
    }

    /// Select the conversation to join.
    pub async fn select_conversation(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.command(Command::SelectConversation(conversation_id)).await
    }

    /// Send a message.
    ///
    /// Resolves once the frame is queued on the stream, not when it is echoed;
    /// the pending entry shows up in [`SessionView::pending`] until then.
    ///
    /// # Errors
    ///
    /// - `ClientError::Rejected` for empty or oversized bodies, or when the
    ///   stream is not open
    /// - `ClientError::Stopped` if the runtime is gone
    pub async fn send(&self, body: impl Into<String>) -> Result<(), ClientError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Send { body: body.into(), reply }).await?;
        response.await.map_err(|_| ClientError::Stopped)?.map_err(ClientError::from)
    }

    /// Reconnect after a failure or a server-side close.
    pub async fn retry(&self) -> Result<(), ClientError> {
        self.command(Command::Retry).await
    }

    /// Leave the conversation and close the stream.
    pub async fn teardown(&self) -> Result<(), ClientError> {
        self.command(Command::Teardown).await
    }

    /// Hide the current banner.
    pub async fn dismiss_banner(&self) -> Result<(), ClientError> {
        self.command(Command::DismissBanner).await
    }

    /// Tear down and stop the runtime.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.command(Command::Shutdown).await
    }

    /// Latest view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).await.map_err(|_| ClientError::Stopped)
    }
}
