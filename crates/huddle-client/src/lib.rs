//! Async driver for huddle chat sessions.
//!
//! Wraps the sans-IO [`huddle_core::ChatSession`] in a tokio task that owns
//! the WebSocket stream, the HTTP collaborator and the timers. Callers talk
//! to it through a [`SessionHandle`] and render from [`SessionView`]s.
//!
//! # Architecture
//!
//! ```text
//! SessionHandle ──commands──> Runtime ──SessionEvent──> ChatSession
//!       ^                      │  ^                         │
//!       └──── watch<View> ─────┘  └────── SessionAction ────┘
//!                              │
//!                 Connector / HttpCollaborator tasks
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod handle;
pub mod http;
pub mod runtime;
pub mod system_env;
pub mod transport;

use std::sync::Arc;

pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use handle::{Banner, SessionHandle, SessionView};
pub use http::HttpCollaborator;
pub use runtime::Runtime;
pub use system_env::SystemEnv;
use tokio::task::JoinHandle;
pub use transport::{Connector, Link, RemoteEnd, TransportCommand, TransportEvent, WsConnector};

/// Start a session runtime against the backend described by `config`.
///
/// Must be called inside a tokio runtime. The session stays idle until an
/// identity and a conversation are provided through the handle.
///
/// # Errors
///
/// - `ClientError::Http` if the HTTP client cannot be built
pub fn spawn(config: ClientConfig) -> Result<(SessionHandle, JoinHandle<()>), ClientError> {
    let config = Arc::new(config);
    let collaborator = HttpCollaborator::new(Arc::clone(&config))?;
    let connector = WsConnector::new(Arc::clone(&config));
    let (runtime, handle) = Runtime::new(SystemEnv::new(), config.session, connector, collaborator);
    Ok((handle, tokio::spawn(runtime.run())))
}
