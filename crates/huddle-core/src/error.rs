//! Error types for session operations.

use huddle_proto::ProtocolError;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors returned to the caller of a session operation.
///
/// These are rejections of a single request; none of them changes the
/// session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Body was empty after trimming
    #[error("message is empty")]
    EmptyMessage,

    /// Body exceeds the character limit
    #[error("message is too long: {len} characters (max {max})")]
    MessageTooLong {
        /// Length in characters
        len: usize,
        /// Limit in characters
        max: usize,
    },

    /// No open stream to send on
    #[error("cannot send while {state}")]
    NotOpen {
        /// State at the time of the request
        state: ConnectionState,
    },

    /// Frame could not be encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the same request can succeed later without edits.
    ///
    /// Only a closed stream qualifies; invalid bodies stay invalid.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotOpen { .. })
    }

    pub(crate) fn from_body(error: ProtocolError) -> Self {
        match error {
            ProtocolError::EmptyField(_) => Self::EmptyMessage,
            ProtocolError::BodyTooLong { len, max } => Self::MessageTooLong { len, max },
            other => Self::Protocol(other),
        }
    }
}
