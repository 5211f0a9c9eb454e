//! Shared harness for driving a `ChatSession` on a manual clock.
//!
//! The harness plays the driver: it records every action the session emits
//! and feeds transport and collaborator outcomes back in, tagged with the
//! generation or epoch the session asked for.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{TimeZone, Utc};
use huddle_core::{
    ChatSession, ConnectionState, ConversationId, Environment, HistoryError, Identity, ManualEnv,
    Message, SessionAction, SessionConfig, SessionError, SessionEvent, SessionUpdate,
    VirtualInstant,
};
use huddle_proto::{CloseCode, HistoryRecord, OutboundFrame};
use serde_json::{Value, json};

/// Authoritative timestamp used by frames built here.
pub const TS: &str = "2024-01-01T00:00:00Z";

pub struct Harness {
    pub env: ManualEnv,
    pub session: ChatSession<ManualEnv>,
    /// Every action emitted so far, in order
    pub actions: Vec<SessionAction>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let env = ManualEnv::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        Self { session: ChatSession::new(env.clone(), config), env, actions: Vec::new() }
    }

    /// Feed an event that must not be rejected.
    pub fn apply(&mut self, event: SessionEvent<VirtualInstant>) -> Vec<SessionAction> {
        let actions = self.session.handle(event).expect("event rejected");
        self.actions.extend(actions.iter().cloned());
        actions
    }

    pub fn try_send(&mut self, body: &str) -> Result<Vec<SessionAction>, SessionError> {
        let result = self.session.handle(SessionEvent::SendMessage { body: body.to_string() });
        if let Ok(actions) = &result {
            self.actions.extend(actions.iter().cloned());
        }
        result
    }

    /// Resolve `user` and select `conversation`.
    pub fn join(&mut self, user: &str, conversation: &str) -> Vec<SessionAction> {
        let mut actions =
            self.apply(SessionEvent::IdentityResolved(Identity::new(user, user.to_uppercase())));
        actions.extend(self.apply(SessionEvent::ConversationSelected(conversation_id(conversation))));
        actions
    }

    /// Join, open the stream and load an empty history.
    pub fn ready(user: &str, conversation: &str) -> Self {
        let mut harness = Self::new();
        harness.join(user, conversation);
        harness.open();
        harness.load_history(Vec::new());
        harness
    }

    pub fn last_connect(&self) -> Option<u64> {
        self.actions.iter().rev().find_map(|a| match a {
            SessionAction::Connect { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    pub fn connects(&self) -> usize {
        self.actions.iter().filter(|a| matches!(a, SessionAction::Connect { .. })).count()
    }

    pub fn last_history_epoch(&self) -> Option<u64> {
        self.actions.iter().rev().find_map(|a| match a {
            SessionAction::FetchHistory { epoch, .. } => Some(*epoch),
            _ => None,
        })
    }

    pub fn history_requests(&self) -> usize {
        self.actions.iter().filter(|a| matches!(a, SessionAction::FetchHistory { .. })).count()
    }

    /// Report the most recent connect as opened.
    pub fn open(&mut self) -> Vec<SessionAction> {
        let generation = self.last_connect().expect("no connect issued");
        self.apply(SessionEvent::TransportOpened { generation })
    }

    pub fn load_history(&mut self, messages: Vec<Message>) -> Vec<SessionAction> {
        let epoch = self.last_history_epoch().expect("no history requested");
        self.apply(SessionEvent::HistoryLoaded { epoch, result: Ok(messages) })
    }

    pub fn fail_history(&mut self) -> Vec<SessionAction> {
        let epoch = self.last_history_epoch().expect("no history requested");
        self.apply(SessionEvent::HistoryLoaded {
            epoch,
            result: Err(HistoryError::Unavailable("503 Service Unavailable".into())),
        })
    }

    /// Deliver a frame on the current stream.
    pub fn receive(&mut self, frame: Value) -> Vec<SessionAction> {
        let generation = self.session.connection().generation();
        self.apply(SessionEvent::FrameReceived { generation, text: frame.to_string() })
    }

    /// Close the current stream with `code`.
    pub fn drop_stream(&mut self, code: u16) -> Vec<SessionAction> {
        let generation = self.session.connection().generation();
        self.apply(SessionEvent::TransportClosed {
            generation,
            code: CloseCode::new(code),
            reason: None,
        })
    }

    /// Advance the clock and tick.
    pub fn advance(&mut self, duration: Duration) -> Vec<SessionAction> {
        self.env.advance(duration);
        let now = self.env.now();
        self.apply(SessionEvent::Tick { now })
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.session.snapshot().iter().map(|m| m.body.clone()).collect()
    }

    pub fn sent_frames(&self) -> Vec<OutboundFrame> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::SendFrame { frame, .. } => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Notify(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn conversation_id(raw: &str) -> ConversationId {
    ConversationId::new(raw).unwrap()
}

pub fn message_frame(id: Option<&str>, user: &str, body: &str) -> Value {
    let mut frame = json!({
        "type": "message",
        "user": user,
        "username": user.to_uppercase(),
        "message": body,
        "timestamp": TS,
    });
    if let Some(id) = id {
        frame["id"] = Value::String(id.to_string());
    }
    frame
}

/// A normalized history message.
pub fn stored(conversation: &str, id: Option<&str>, user: &str, body: &str) -> Message {
    let record = HistoryRecord {
        id: id.map(str::to_string),
        user: user.to_string(),
        username: Some(user.to_uppercase()),
        message: body.to_string(),
        timestamp: Some(TS.to_string()),
    };
    Message::from_record(&conversation_id(conversation), &record).unwrap()
}
