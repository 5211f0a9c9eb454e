//! Error types for the async driver.

use huddle_core::SessionError;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Established stream failed.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Errors surfaced through [`crate::SessionHandle`] and client setup.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server URL unusable for building endpoints.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    Http(String),

    /// The session refused the request.
    #[error(transparent)]
    Rejected(#[from] SessionError),

    /// The session runtime is no longer running.
    #[error("session runtime stopped")]
    Stopped,
}
