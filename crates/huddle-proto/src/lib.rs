//! Huddle wire formats
//!
//! Everything that crosses a process boundary between the chat client and the
//! chat backend:
//!
//! - [`InboundFrame`]: JSON frames received over the conversation stream
//! - [`OutboundFrame`]: JSON frames the client sends (identify, message)
//! - [`HistoryRecord`] / [`PresenceResponse`]: HTTP collaborator bodies
//! - [`CloseCode`]: stream closure codes and their retry semantics
//!
//! The crate performs no I/O. Parsing is strict about structure (a frame that
//! does not decode is a [`ProtocolError`]) but lenient about the field aliases
//! older backend versions emit.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aliases;
mod close;
mod errors;
mod frame;
mod http;
pub mod timestamp;

pub use close::CloseCode;
pub use errors::{ProtocolError, Result};
pub use frame::{
    IdentifyAck, InboundFrame, MAX_BODY_CHARS, MessageFrame, OutboundFrame, PresenceFrame,
    validate_body,
};
pub use http::{HistoryRecord, PresenceResponse};
