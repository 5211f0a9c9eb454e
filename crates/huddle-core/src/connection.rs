//! Connection lifecycle state machine.
//!
//! Owns the single live stream of a session: opening it, announcing the
//! identity, timing out a stuck handshake, backing off after drops and tearing
//! down on request. Uses the action pattern: methods take time as input and
//! return [`ConnectionAction`]s for the driver to execute, and transport
//! outcomes are fed back in.
//!
//! # State Machine
//!
//! ```text
//!            open            opened
//! ┌──────┐ ─────────> ┌────────────┐ ───────> ┌──────┐
//! │ Idle │            │ Connecting │          │ Open │
//! └──────┘ <───┐      └────────────┘          └──────┘
//!     ^        │ close       │  ^  drop/timeout   │
//!     │        │             ↓  │                 ↓
//!     │   ┌────────┐  ┌──────────────┐  code != 1000  ┌────────┐
//!     │   │ Failed │<─│ Reconnecting │<───────────────│ Closed │
//!     │   └────────┘  └──────────────┘                └────────┘
//!     └─────────── close (from any state) ────────────────┘
//! ```
//!
//! # Generations
//!
//! Every connect attempt and every teardown bumps a generation counter.
//! Actions carry the generation they were issued for, and transport outcomes
//! must carry it back; outcomes for any other generation are stale and
//! ignored. This is what keeps a late "opened" from resurrecting a stream the
//! user already left.
//!
//! # Invariants
//!
//! - At most one stream is live (Connecting or Open) at a time.
//! - Exactly one identify frame is emitted per opened stream, before any user
//!   send can be accepted.
//! - A 1000 closure never schedules a reconnect.
//! - The attempt counter resets on a successful open and on manual retry.

use std::{fmt, ops::Add, time::Duration};

use huddle_proto::{CloseCode, OutboundFrame};
use tracing::{debug, info, warn};

use crate::{
    context::{ConversationId, ResolvedSession, SessionContext},
    error::SessionError,
    reconnect::ReconnectPolicy,
};

/// Time allowed for a stream to open.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reason attached to the closure synthesized for a stuck handshake.
pub const HANDSHAKE_TIMEOUT_REASON: &str = "handshake timeout";

/// Actions returned by the connection state machine.
///
/// The driver executes the transport actions (`Connect`, `SendFrame`,
/// `Close`, `Abort`, `RefreshPresence`); `StateChanged` and `RetryExhausted`
/// are notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a stream to the conversation
    Connect {
        /// Generation to report the outcome under
        generation: u64,
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// Send this frame on the stream of `generation`
    SendFrame {
        /// Stream generation
        generation: u64,
        /// Frame to send
        frame: OutboundFrame,
    },

    /// Close the stream of `generation` with a close frame
    Close {
        /// Stream generation
        generation: u64,
        /// Close code to send
        code: CloseCode,
        /// Close reason to send
        reason: String,
    },

    /// Drop the stream of `generation` without a close handshake
    Abort {
        /// Stream generation
        generation: u64,
    },

    /// Read the online count once
    RefreshPresence {
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// The state changed to this value
    StateChanged(ConnectionState),

    /// Reconnecting stopped after this many failed attempts
    RetryExhausted {
        /// Attempts made
        attempts: u32,
    },
}

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream and none scheduled
    Idle,
    /// Stream requested, not yet open
    Connecting,
    /// Stream open and identified
    Open,
    /// Stream closed by the peer or the network
    Closed {
        /// Closure code
        code: CloseCode,
        /// Closure reason, if any
        reason: Option<String>,
    },
    /// Waiting to reconnect
    Reconnecting {
        /// Failed attempts so far (1-based)
        attempt: u32,
    },
    /// Gave up reconnecting; only a manual retry leaves this state
    Failed {
        /// Attempts made
        attempts: u32,
    },
}

impl ConnectionState {
    /// A stream exists (Connecting or Open).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("connected"),
            Self::Closed { code, reason: Some(reason) } => {
                write!(f, "disconnected ({code}: {reason})")
            },
            Self::Closed { code, reason: None } => write!(f, "disconnected ({code})"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Failed { attempts } => write!(f, "failed after {attempts} attempts"),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Time allowed for a stream to open
    pub handshake_timeout: Duration,
    /// Backoff schedule after drops
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT, reconnect: ReconnectPolicy::default() }
    }
}

/// Connection state machine
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I> {
    state: ConnectionState,
    config: ConnectionConfig,
    /// Who and where, fixed from open until teardown
    target: Option<ResolvedSession>,
    generation: u64,
    /// Consecutive failed attempts
    attempt: u32,
    /// Open was requested before identity/conversation were known
    open_deferred: bool,
    handshake_deadline: Option<I>,
    reconnect_at: Option<I>,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create a manager in [`ConnectionState::Idle`]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            config,
            target: None,
            generation: 0,
            attempt: 0,
            open_deferred: false,
            handshake_deadline: None,
            reconnect_at: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current generation. Outcomes tagged with any other value are stale.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `generation` is the current one.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Consecutive failed attempts.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Identity and conversation of the current lifecycle.
    #[must_use]
    pub fn target(&self) -> Option<&ResolvedSession> {
        self.target.as_ref()
    }

    /// An open request is waiting for identity or conversation.
    #[must_use]
    pub fn is_open_deferred(&self) -> bool {
        self.open_deferred
    }

    /// User sends are accepted only on an open, identified stream.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// When [`Self::tick`] next has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        match self.state {
            ConnectionState::Connecting => self.handshake_deadline,
            ConnectionState::Reconnecting { .. } => self.reconnect_at,
            _ => None,
        }
    }

    /// Open a stream for the context's identity and conversation.
    ///
    /// Defers (no actions) while either is unknown; the caller re-invokes
    /// `open` once they are. Tears down any existing stream first.
    pub fn open(&mut self, now: I, context: &SessionContext) -> Vec<ConnectionAction> {
        let Some(target) = context.resolved() else {
            debug!("identity or conversation unresolved, deferring open");
            self.open_deferred = true;
            return Vec::new();
        };

        let mut actions = self.close("reopening");
        self.target = Some(target);
        self.attempt = 0;
        actions.extend(self.connect(now));
        actions
    }

    fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(target) = &self.target else {
            return Vec::new();
        };
        let conversation_id = target.conversation_id.clone();

        self.generation += 1;
        self.reconnect_at = None;
        self.handshake_deadline = Some(now + self.config.handshake_timeout);
        self.state = ConnectionState::Connecting;

        debug!(
            generation = self.generation,
            conversation = %conversation_id,
            attempt = self.attempt,
            "connecting"
        );

        vec![
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Connect { generation: self.generation, conversation_id },
        ]
    }

    /// The stream of `generation` opened.
    ///
    /// Emits the identify frame and a presence refresh.
    pub fn on_opened(&mut self, generation: u64) -> Vec<ConnectionAction> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "ignoring stale open");
            return Vec::new();
        }
        let Some(target) = &self.target else {
            return Vec::new();
        };

        let identify =
            OutboundFrame::identify(&target.identity.user_id, &target.identity.display_name);
        let conversation_id = target.conversation_id.clone();

        self.state = ConnectionState::Open;
        self.attempt = 0;
        self.handshake_deadline = None;

        info!(generation, conversation = %conversation_id, "stream open");

        vec![
            ConnectionAction::StateChanged(ConnectionState::Open),
            ConnectionAction::SendFrame { generation, frame: identify },
            ConnectionAction::RefreshPresence { conversation_id },
        ]
    }

    /// The stream of `generation` closed with `code`.
    ///
    /// Code 1000 ends in Closed. Anything else counts one failed attempt and
    /// either schedules a reconnect or, past the ceiling, ends in Failed.
    pub fn on_closed(
        &mut self,
        generation: u64,
        code: CloseCode,
        reason: Option<String>,
        now: I,
    ) -> Vec<ConnectionAction> {
        if !self.is_current(generation) || !self.state.is_live() {
            debug!(generation, current = self.generation, %code, "ignoring stale closure");
            return Vec::new();
        }

        self.handshake_deadline = None;
        self.state = ConnectionState::Closed { code, reason };
        let mut actions = vec![ConnectionAction::StateChanged(self.state.clone())];

        if code.is_deliberate() {
            info!(generation, "stream closed normally");
            return actions;
        }

        self.attempt = self.attempt.saturating_add(1);
        let policy = self.config.reconnect;

        if !policy.should_retry(self.attempt) {
            warn!(generation, %code, attempts = self.attempt, "giving up reconnecting");
            self.state = ConnectionState::Failed { attempts: self.attempt };
            actions.push(ConnectionAction::StateChanged(self.state.clone()));
            actions.push(ConnectionAction::RetryExhausted { attempts: self.attempt });
            return actions;
        }

        let delay = policy.next_delay(self.attempt - 1);
        self.reconnect_at = Some(now + delay);
        self.state = ConnectionState::Reconnecting { attempt: self.attempt };

        warn!(
            generation,
            %code,
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "stream lost, reconnecting"
        );

        actions.push(ConnectionAction::StateChanged(self.state.clone()));
        actions
    }

    /// Process timers: handshake timeout and scheduled reconnects.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting
                if self.handshake_deadline.is_some_and(|deadline| now >= deadline) =>
            {
                let generation = self.generation;
                warn!(generation, "handshake timed out");

                let mut actions = vec![ConnectionAction::Abort { generation }];
                actions.extend(self.on_closed(
                    generation,
                    CloseCode::ABNORMAL,
                    Some(HANDSHAKE_TIMEOUT_REASON.to_string()),
                    now,
                ));
                actions
            },
            ConnectionState::Reconnecting { .. }
                if self.reconnect_at.is_some_and(|at| now >= at) =>
            {
                self.connect(now)
            },
            _ => Vec::new(),
        }
    }

    /// Tear down: close the live stream (code 1000), cancel any scheduled
    /// reconnect and return to Idle.
    ///
    /// Idempotent. Bumps the generation so in-flight outcomes become stale.
    pub fn close(&mut self, reason: &str) -> Vec<ConnectionAction> {
        self.open_deferred = false;
        self.reconnect_at = None;
        self.handshake_deadline = None;
        self.attempt = 0;

        if self.state == ConnectionState::Idle {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.state.is_live() {
            actions.push(ConnectionAction::Close {
                generation: self.generation,
                code: CloseCode::NORMAL,
                reason: reason.to_string(),
            });
        }

        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.target = None;
        info!(reason, "connection torn down");

        actions.push(ConnectionAction::StateChanged(ConnectionState::Idle));
        actions
    }

    /// Manual retry.
    ///
    /// From Failed or Closed, reconnects immediately with the attempt counter
    /// reset. From Idle, behaves like [`Self::open`]. Ignored otherwise.
    pub fn retry(&mut self, now: I, context: &SessionContext) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Failed { .. } | ConnectionState::Closed { .. } => {
                if let Some(target) = context.resolved() {
                    self.target = Some(target);
                }
                self.attempt = 0;
                info!("manual retry");
                self.connect(now)
            },
            ConnectionState::Idle => self.open(now, context),
            _ => {
                debug!(state = %self.state, "retry ignored");
                Vec::new()
            },
        }
    }

    /// Wrap `frame` for the open stream.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotOpen` unless the stream is open
    pub fn send_frame(&self, frame: OutboundFrame) -> Result<ConnectionAction, SessionError> {
        if !self.can_send() {
            return Err(SessionError::NotOpen { state: self.state.clone() });
        }
        Ok(ConnectionAction::SendFrame { generation: self.generation, frame })
    }
}
