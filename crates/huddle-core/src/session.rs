//! Chat session coordinator.
//!
//! [`ChatSession`] wires the pieces together for one view: the session
//! context, the connection manager, the message store, the presence tracker
//! and the pending-send list. It is a pure state machine: feed it
//! [`SessionEvent`]s, execute the [`SessionAction`]s it returns.
//!
//! # Data flow
//!
//! ```text
//!  identity + conversation ──> FetchHistory ───────────┐
//!                          └─> Connect ─> opened ─> identify, FetchPresence
//!                                                       │
//!  live frames ──(buffered while history pending)──> merge ──> MessageStore
//! ```
//!
//! # Epochs
//!
//! History and presence reads are tagged with the session epoch, which moves
//! on every teardown and conversation switch (not on reconnects). A result
//! from an older epoch is discarded, so a slow read can never write into a
//! conversation the user already left.
//!
//! # Ordering
//!
//! The log is append-only. Live frames that arrive while history is still
//! loading are buffered and merged after it, so history always precedes them.

use std::time::Duration;

use huddle_proto::{InboundFrame, OutboundFrame, validate_body};
use tracing::{debug, warn};

use crate::{
    connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState},
    context::{ConversationId, Identity, SessionContext},
    env::Environment,
    error::SessionError,
    event::{PendingMessage, SessionAction, SessionEvent, SessionUpdate},
    history::{self, HistoryError},
    message::Message,
    presence::{PresenceError, PresenceTracker},
    store::{MessageStore, Snapshot},
};

/// Progress of the initial history load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    /// No load issued in this epoch
    NotRequested,
    /// Load in flight; live messages are buffered
    Pending,
    /// Loaded this many messages
    Loaded {
        /// Messages returned
        count: usize,
    },
    /// Load failed; the fallback notice was shown
    Unavailable {
        /// Failure description
        reason: String,
    },
}

/// Session configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Handshake timeout and reconnect policy
    pub connection: ConnectionConfig,
    /// Re-read the online count this often while open. `None` relies on
    /// pushes and the refresh on open.
    pub presence_poll_interval: Option<Duration>,
}

/// One user's session in one conversation.
#[derive(Debug)]
pub struct ChatSession<E: Environment> {
    env: E,
    context: SessionContext,
    connection: ConnectionManager<E::Instant>,
    store: MessageStore,
    presence: PresenceTracker<E::Instant>,
    pending: Vec<PendingMessage>,
    history: HistoryStatus,
    /// Live messages received while history is pending
    backlog: Vec<Message>,
    epoch: u64,
}

impl<E: Environment> ChatSession<E> {
    /// Create an idle session.
    pub fn new(env: E, config: SessionConfig) -> Self {
        Self {
            env,
            context: SessionContext::new(),
            connection: ConnectionManager::new(config.connection),
            store: MessageStore::new(),
            presence: PresenceTracker::new(config.presence_poll_interval),
            pending: Vec::new(),
            history: HistoryStatus::NotRequested,
            backlog: Vec::new(),
            epoch: 0,
        }
    }

    /// Connection state
    pub fn state(&self) -> &ConnectionState {
        self.connection.state()
    }

    /// Connection manager
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    /// Identity and conversation inputs
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Local identity, if known
    pub fn identity(&self) -> Option<&Identity> {
        self.context.identity()
    }

    /// Message log snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Message log
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Online count
    pub fn presence(&self) -> u32 {
        self.presence.count()
    }

    /// Sends awaiting their echo, oldest first
    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// History load progress
    pub fn history(&self) -> &HistoryStatus {
        &self.history
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Earliest time a [`SessionEvent::Tick`] has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        match (self.connection.next_deadline(), self.presence.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Only `SendMessage` fails, and only as a rejection of that message:
    ///
    /// - `SessionError::EmptyMessage` / `MessageTooLong` for an invalid body
    /// - `SessionError::NotOpen` unless the stream is open
    pub fn handle(
        &mut self,
        event: SessionEvent<E::Instant>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let actions = match event {
            SessionEvent::IdentityResolved(identity) => {
                if self.context.set_identity(identity) {
                    self.restart()
                } else {
                    Vec::new()
                }
            },
            SessionEvent::IdentityCleared => {
                if self.context.clear_identity() {
                    self.teardown()
                } else {
                    Vec::new()
                }
            },
            SessionEvent::ConversationSelected(conversation_id) => {
                if self.context.select_conversation(conversation_id) {
                    self.restart()
                } else {
                    Vec::new()
                }
            },
            SessionEvent::Teardown => {
                self.context.clear_conversation();
                self.teardown()
            },
            SessionEvent::Retry => self.retry(),
            SessionEvent::SendMessage { body } => return self.send(&body),
            SessionEvent::TransportOpened { generation } => {
                let now = self.env.now();
                let actions = self.connection.on_opened(generation);
                self.absorb(actions, now)
            },
            SessionEvent::FrameReceived { generation, text } => self.on_frame(generation, &text),
            SessionEvent::TransportClosed { generation, code, reason } => {
                let now = self.env.now();
                let actions = self.connection.on_closed(generation, code, reason, now);
                self.absorb(actions, now)
            },
            SessionEvent::HistoryLoaded { epoch, result } => self.on_history(epoch, result),
            SessionEvent::PresenceFetched { epoch, result } => self.on_presence(epoch, result),
            SessionEvent::Tick { now } => self.on_tick(now),
        };

        Ok(actions)
    }

    /// Open for the current context: history read plus stream.
    fn start(&mut self) -> Vec<SessionAction> {
        let now = self.env.now();

        let Some(target) = self.context.resolved() else {
            self.connection.open(now, &self.context);
            if self.context.conversation_id().is_some() {
                debug!("waiting for identity before connecting");
                return vec![SessionAction::Notify(SessionUpdate::AwaitingIdentity)];
            }
            return Vec::new();
        };

        self.history = HistoryStatus::Pending;
        self.backlog.clear();

        let mut actions = vec![SessionAction::FetchHistory { epoch: self.epoch, target }];
        let opened = self.connection.open(now, &self.context);
        actions.extend(self.absorb(opened, now));
        actions
    }

    fn restart(&mut self) -> Vec<SessionAction> {
        let mut actions = self.teardown();
        actions.extend(self.start());
        actions
    }

    /// Close everything and forget the conversation's state. Idempotent.
    fn teardown(&mut self) -> Vec<SessionAction> {
        let now = self.env.now();
        let closed = self.connection.close("teardown");
        let actions = self.absorb(closed, now);

        self.epoch += 1;
        self.history = HistoryStatus::NotRequested;
        self.backlog.clear();
        self.store.clear();
        actions
    }

    fn retry(&mut self) -> Vec<SessionAction> {
        if *self.connection.state() == ConnectionState::Idle {
            return self.start();
        }
        let now = self.env.now();
        let actions = self.connection.retry(now, &self.context);
        self.absorb(actions, now)
    }

    fn send(&mut self, body: &str) -> Result<Vec<SessionAction>, SessionError> {
        let body = body.trim();
        validate_body(body).map_err(SessionError::from_body)?;

        let Some(target) = self.connection.target().filter(|_| self.connection.can_send()) else {
            return Err(SessionError::NotOpen { state: self.connection.state().clone() });
        };

        let issued_at = self.env.wall_clock();
        let frame = OutboundFrame::message(
            &target.identity.user_id,
            &target.identity.display_name,
            body,
            issued_at,
        );
        let action = self.connection.send_frame(frame)?;

        let pending = PendingMessage { local_id: self.env.random_u64(), body: body.to_string(), issued_at };
        self.pending.push(pending.clone());

        let mut actions = self.absorb(vec![action], self.env.now());
        actions.push(SessionAction::Notify(SessionUpdate::Sending(pending)));
        Ok(actions)
    }

    fn on_frame(&mut self, generation: u64, text: &str) -> Vec<SessionAction> {
        if !self.connection.is_current(generation) || !self.connection.can_send() {
            debug!(generation, "dropping frame from stale stream");
            return Vec::new();
        }

        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "dropping malformed frame");
                return Vec::new();
            },
        };

        match frame {
            InboundFrame::Message(frame) => {
                let Some(conversation_id) = self.conversation_id() else {
                    return Vec::new();
                };
                match Message::from_frame(&conversation_id, &frame) {
                    Ok(message) if self.history == HistoryStatus::Pending => {
                        self.backlog.push(message);
                        Vec::new()
                    },
                    Ok(message) => self.append(message),
                    Err(error) => {
                        warn!(%error, "dropping invalid message frame");
                        Vec::new()
                    },
                }
            },
            InboundFrame::Presence(presence) => {
                if self.presence.on_push(presence.count) {
                    vec![SessionAction::Notify(SessionUpdate::Presence(presence.count))]
                } else {
                    Vec::new()
                }
            },
            InboundFrame::Identify(ack) => {
                debug!(user = ?ack.user, "identify acknowledged");
                Vec::new()
            },
        }
    }

    fn on_history(
        &mut self,
        epoch: u64,
        result: Result<Vec<Message>, HistoryError>,
    ) -> Vec<SessionAction> {
        if epoch != self.epoch || self.history != HistoryStatus::Pending {
            debug!(epoch, current = self.epoch, "discarding stale history");
            return Vec::new();
        }

        let mut actions = Vec::new();
        match result {
            Ok(messages) => {
                self.history = HistoryStatus::Loaded { count: messages.len() };
                for message in messages {
                    actions.extend(self.append(message));
                }
            },
            Err(error) => {
                warn!(%error, "history unavailable, showing notice");
                let reason = error.to_string();
                self.history = HistoryStatus::Unavailable { reason: reason.clone() };
                if let Some(conversation_id) = self.conversation_id() {
                    for notice in history::fallback(&conversation_id, self.env.wall_clock()) {
                        actions.extend(self.append(notice));
                    }
                }
                actions.push(SessionAction::Notify(SessionUpdate::HistoryUnavailable { reason }));
            },
        }

        for message in std::mem::take(&mut self.backlog) {
            actions.extend(self.append(message));
        }
        actions
    }

    fn on_presence(
        &mut self,
        epoch: u64,
        result: Result<u32, PresenceError>,
    ) -> Vec<SessionAction> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale presence");
            return Vec::new();
        }

        match result {
            Ok(_) if !self.connection.can_send() => {
                debug!("presence arrived after stream closed");
                Vec::new()
            },
            Ok(count) => {
                if self.presence.on_refresh(count) {
                    vec![SessionAction::Notify(SessionUpdate::Presence(count))]
                } else {
                    Vec::new()
                }
            },
            Err(error) => {
                warn!(%error, count = self.presence.count(), "presence refresh failed, keeping last count");
                Vec::new()
            },
        }
    }

    fn on_tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        let due = self.connection.tick(now);
        let mut actions = self.absorb(due, now);

        if self.connection.can_send() && self.presence.poll_due(now) {
            if let Some(conversation_id) = self.conversation_id() {
                actions.push(SessionAction::FetchPresence { epoch: self.epoch, conversation_id });
            }
        }
        actions
    }

    /// Merge into the log, resolving a matching pending send.
    fn append(&mut self, message: Message) -> Vec<SessionAction> {
        let own = self.connection.target().is_some_and(|t| message.is_self(&t.identity));

        if !self.store.merge(message.clone()) {
            debug!(id = %message.id, "duplicate message ignored");
            return Vec::new();
        }

        let mut actions = Vec::new();
        if own {
            if let Some(index) = self.pending.iter().position(|p| p.body == message.body) {
                let delivered = self.pending.remove(index);
                actions.push(SessionAction::Notify(SessionUpdate::Delivered {
                    local_id: delivered.local_id,
                }));
            }
        }
        actions.push(SessionAction::Notify(SessionUpdate::MessageAppended(message)));
        actions
    }

    /// Translate connection actions, applying their side effects here.
    fn absorb(&mut self, actions: Vec<ConnectionAction>, now: E::Instant) -> Vec<SessionAction> {
        let mut out = Vec::with_capacity(actions.len());

        for action in actions {
            match action {
                ConnectionAction::Connect { generation, conversation_id } => {
                    out.push(SessionAction::Connect { generation, conversation_id });
                },
                ConnectionAction::SendFrame { generation, frame } => {
                    out.push(SessionAction::SendFrame { generation, frame });
                },
                ConnectionAction::Close { generation, code, reason } => {
                    out.push(SessionAction::CloseTransport { generation, code, reason });
                },
                ConnectionAction::Abort { generation } => {
                    out.push(SessionAction::AbortTransport { generation });
                },
                ConnectionAction::RefreshPresence { conversation_id } => {
                    out.push(SessionAction::FetchPresence { epoch: self.epoch, conversation_id });
                },
                ConnectionAction::StateChanged(state) => {
                    let open = state == ConnectionState::Open;
                    out.push(SessionAction::Notify(SessionUpdate::Connection(state)));
                    if open {
                        self.presence.start_polling(now);
                    } else {
                        out.extend(self.on_stream_down());
                    }
                },
                ConnectionAction::RetryExhausted { attempts } => {
                    out.push(SessionAction::Notify(SessionUpdate::RetryExhausted { attempts }));
                },
            }
        }
        out
    }

    fn on_stream_down(&mut self) -> Vec<SessionAction> {
        let mut out = Vec::new();
        if self.presence.reset() {
            out.push(SessionAction::Notify(SessionUpdate::Presence(0)));
        }
        for abandoned in self.pending.drain(..) {
            out.push(SessionAction::Notify(SessionUpdate::SendAbandoned {
                local_id: abandoned.local_id,
            }));
        }
        out
    }

    fn conversation_id(&self) -> Option<ConversationId> {
        self.connection
            .target()
            .map(|t| t.conversation_id.clone())
            .or_else(|| self.context.conversation_id().cloned())
    }
}
