//! Sans-IO core of the huddle chat session manager.
//!
//! Everything here is a pure state machine or plain data: no sockets, no HTTP,
//! no clocks. Drivers feed events in and execute the actions that come out;
//! [`Environment`] supplies time and randomness so the same logic runs under
//! real time or a manually advanced clock.
//!
//! # Components
//!
//! - [`ChatSession`]: per-view coordinator, the only type most drivers touch
//! - [`ConnectionManager`]: stream lifecycle, identify, timeouts, backoff
//! - [`MessageStore`]: append-only deduplicated log with cheap snapshots
//! - [`HistoryLoader`]: initial history read and normalization
//! - [`PresenceTracker`]: online count from pushes, refreshes and polls
//! - [`ReconnectPolicy`]: exponential backoff arithmetic

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod context;
pub mod env;
pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod presence;
pub mod reconnect;
pub mod session;
pub mod store;

pub use connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState};
pub use context::{ConversationId, Identity, ResolvedSession, SessionContext};
pub use env::{Environment, ManualEnv, VirtualInstant};
pub use error::SessionError;
pub use event::{PendingMessage, SessionAction, SessionEvent, SessionUpdate};
pub use history::{HistoryError, HistoryLoader, HistorySource};
pub use message::{Message, MessageId};
pub use presence::{PresenceError, PresenceSource, PresenceTracker};
pub use reconnect::{ReconnectPolicy, should_retry};
pub use session::{ChatSession, HistoryStatus, SessionConfig};
pub use store::{MessageStore, Snapshot};
