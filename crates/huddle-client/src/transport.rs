//! Stream transport for the session runtime.
//!
//! A [`Connector`] opens one stream per [`huddle_core::SessionAction::Connect`]
//! and hands back a [`Link`]: a pair of channels bridged to a background task
//! that owns the socket. The runtime only ever sees channel traffic, so tests
//! substitute an in-memory connector built on [`Link::pair`].

use std::{future::Future, sync::Arc};

use futures::{Sink, SinkExt, Stream, StreamExt};
use huddle_core::ConversationId;
use huddle_proto::CloseCode;
use tokio::{sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Error as WsError, Message as WsMessage,
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::{CloseFrame, frame::coding::CloseCode as WsCloseCode},
    },
};
use tracing::{debug, info, warn};

use crate::{
    config::{API_KEY_HEADER, ClientConfig},
    error::TransportError,
};

/// Per-direction channel capacity.
pub const LINK_CAPACITY: usize = 64;

/// Outbound instructions for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a text frame
    Text(String),
    /// Send a close frame and stop
    Close {
        /// Close code
        code: CloseCode,
        /// Close reason
        reason: String,
    },
}

/// Inbound traffic from the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Text(String),
    /// The stream ended; always the last event
    Closed {
        /// Close code (1006 when the stream dropped without one)
        code: CloseCode,
        /// Close reason, if any
        reason: Option<String>,
    },
}

/// Runtime side of an open stream.
#[derive(Debug)]
pub struct Link {
    /// Send frames to the server
    pub to_server: mpsc::Sender<TransportCommand>,
    /// Receive frames from the server
    pub from_server: mpsc::Receiver<TransportEvent>,
    abort_handle: Option<AbortHandle>,
}

/// Socket side of a [`Link`].
#[derive(Debug)]
pub struct RemoteEnd {
    /// Commands issued by the runtime
    pub commands: mpsc::Receiver<TransportCommand>,
    /// Events delivered to the runtime
    pub events: mpsc::Sender<TransportEvent>,
}

impl Link {
    /// Connected channel pair.
    pub fn pair(capacity: usize) -> (Self, RemoteEnd) {
        let (to_server, commands) = mpsc::channel(capacity);
        let (events, from_server) = mpsc::channel(capacity);
        (Self { to_server, from_server, abort_handle: None }, RemoteEnd { commands, events })
    }

    /// Attach the task that owns the socket so [`Link::stop`] can abort it.
    #[must_use]
    pub fn with_abort(mut self, handle: AbortHandle) -> Self {
        self.abort_handle = Some(handle);
        self
    }

    /// Abort the socket task without a close handshake.
    pub fn stop(&self) {
        if let Some(handle) = &self.abort_handle {
            handle.abort();
        }
    }
}

/// Opens streams for the runtime.
pub trait Connector: Clone + Send + Sync + 'static {
    /// Open a stream for `conversation_id`.
    ///
    /// Resolves once the stream is open. The runtime reports a failure as an
    /// abnormal closure, so connectors need not retry.
    fn connect(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<Link, TransportError>> + Send;
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: Arc<ClientConfig>,
}

impl WsConnector {
    /// Connector for the stream endpoint described by `config`.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<Link, TransportError>> + Send {
        async move {
            let url = self
                .config
                .stream_url(conversation_id)
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            if let Some(key) = &self.config.api_key {
                let value = HeaderValue::from_str(key)
                    .map_err(|e| TransportError::Connection(format!("api key: {e}")))?;
                request.headers_mut().insert(API_KEY_HEADER, value);
            }

            let (stream, _response) = connect_async(request)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            info!(conversation = %conversation_id, "stream connected");

            let (link, remote) = Link::pair(LINK_CAPACITY);
            let task = tokio::spawn(run_socket(stream, remote));
            Ok(link.with_abort(task.abort_handle()))
        }
    }
}

/// Bridge a WebSocket to the channels of a [`RemoteEnd`].
///
/// Ends with exactly one [`TransportEvent::Closed`] unless the runtime closed
/// the stream itself (or dropped its end), in which case nobody is listening.
async fn run_socket<S>(stream: S, mut remote: RemoteEnd)
where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + Unpin,
{
    let (mut sink, mut source) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            command = remote.commands.recv() => match command {
                Some(TransportCommand::Text(text)) => {
                    if let Err(error) = sink.send(WsMessage::text(text)).await {
                        break (CloseCode::ABNORMAL, Some(error.to_string()));
                    }
                },
                Some(TransportCommand::Close { code, reason }) => {
                    let frame = CloseFrame { code: WsCloseCode::from(code.as_u16()), reason: reason.into() };
                    if let Err(error) = sink.send(WsMessage::Close(Some(frame))).await {
                        debug!(%error, "close frame not delivered");
                    }
                    return;
                },
                None => {
                    if let Err(error) = sink.close().await {
                        debug!(%error, "socket close failed");
                    }
                    return;
                },
            },
            message = source.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    if remote.events.send(TransportEvent::Text(text.to_string())).await.is_err() {
                        return;
                    }
                },
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if remote.events.send(TransportEvent::Text(text)).await.is_err() {
                            return;
                        }
                    },
                    Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => {
                            let reason = frame.reason.to_string();
                            (CloseCode::new(u16::from(frame.code)), Some(reason).filter(|r| !r.is_empty()))
                        },
                        None => (CloseCode::NO_STATUS, None),
                    };
                },
                // Ping and pong are answered by tungstenite
                Some(Ok(_)) => {},
                Some(Err(error)) => break (CloseCode::ABNORMAL, Some(error.to_string())),
                None => break (CloseCode::ABNORMAL, None),
            },
        }
    };

    debug!(%code, ?reason, "stream ended");
    // The runtime may have moved on already
    let _ = remote.events.send(TransportEvent::Closed { code, reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_connects_both_directions() {
        let (mut link, mut remote) = Link::pair(4);

        link.to_server.send(TransportCommand::Text("hi".into())).await.unwrap();
        assert_eq!(remote.commands.recv().await, Some(TransportCommand::Text("hi".into())));

        remote.events.send(TransportEvent::Text("yo".into())).await.unwrap();
        assert_eq!(link.from_server.recv().await, Some(TransportEvent::Text("yo".into())));
    }

    #[tokio::test]
    async fn stop_aborts_the_socket_task() {
        let (link, mut remote) = Link::pair(4);
        let task = tokio::spawn(async move { while remote.commands.recv().await.is_some() {} });
        let link = link.with_abort(task.abort_handle());

        link.stop();

        assert!(task.await.unwrap_err().is_cancelled());
    }
}
