//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding, validating or encoding wire data.
///
/// Every variant describes a payload problem, never a transport problem. The
/// session layer treats all of them as a dropped frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not JSON, or does not match any known frame shape
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A field required for this frame kind is absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but empty
    #[error("empty field: {0}")]
    EmptyField(&'static str),

    /// Message body exceeds the backend limit
    #[error("message body too long: {len} chars (max {max})")]
    BodyTooLong {
        /// Length of the rejected body in characters
        len: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// Timestamp is not ISO-8601
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// Frame could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
