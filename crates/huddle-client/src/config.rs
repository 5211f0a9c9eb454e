//! Client configuration and endpoint layout.
//!
//! One base URL serves both the stream and the HTTP collaborator; the scheme
//! is swapped as needed (`ws`/`http`, `wss`/`https`):
//!
//! - stream: `{base}/chat/ws/{conversation}`
//! - history: `{base}/chat/history/{conversation}`
//! - presence: `{base}/chat/onlinemembers/{conversation}`

use std::time::Duration;

use huddle_core::{ConversationId, SessionConfig};
use reqwest::Url;

use crate::error::ClientError;

/// Default backend address.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";

/// Default timeout for history and presence requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the API key on collaborator requests and the stream
/// upgrade.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (any of ws, wss, http, https)
    pub server_url: Url,
    /// Sent as [`API_KEY_HEADER`] when set
    pub api_key: Option<String>,
    /// Timeout for each collaborator request
    pub request_timeout: Duration,
    /// Session behavior (handshake timeout, backoff, presence polling)
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the server URL.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidUrl` if the URL does not parse or has an
    ///   unsupported scheme
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let server_url =
            Url::parse(server_url).map_err(|e| ClientError::InvalidUrl(format!("{server_url}: {e}")))?;
        if !matches!(server_url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {}",
                server_url.scheme()
            )));
        }

        Ok(Self {
            server_url,
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session: SessionConfig::default(),
        })
    }

    /// Stream endpoint for `conversation_id`.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidUrl` if the base URL cannot carry a path
    pub fn stream_url(&self, conversation_id: &ConversationId) -> Result<Url, ClientError> {
        self.endpoint(Channel::Stream, &["chat", "ws", conversation_id.as_str()])
    }

    /// History endpoint for `conversation_id`.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidUrl` if the base URL cannot carry a path
    pub fn history_url(&self, conversation_id: &ConversationId) -> Result<Url, ClientError> {
        self.endpoint(Channel::Http, &["chat", "history", conversation_id.as_str()])
    }

    /// Presence endpoint for `conversation_id`.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidUrl` if the base URL cannot carry a path
    pub fn presence_url(&self, conversation_id: &ConversationId) -> Result<Url, ClientError> {
        self.endpoint(Channel::Http, &["chat", "onlinemembers", conversation_id.as_str()])
    }

    fn endpoint(&self, channel: Channel, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.server_url.clone();
        let secure = matches!(url.scheme(), "wss" | "https");
        let scheme = match (channel, secure) {
            (Channel::Stream, false) => "ws",
            (Channel::Stream, true) => "wss",
            (Channel::Http, false) => "http",
            (Channel::Http, true) => "https",
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::InvalidUrl(format!("cannot use scheme {scheme}")))?;

        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ClientError::InvalidUrl("base url cannot carry a path".into()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Stream,
    Http,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(raw: &str) -> ConversationId {
        ConversationId::new(raw).unwrap()
    }

    #[test]
    fn endpoints_from_ws_base() {
        let config = ClientConfig::new("ws://localhost:8000").unwrap();
        assert_eq!(config.stream_url(&conv("g1")).unwrap().as_str(), "ws://localhost:8000/chat/ws/g1");
        assert_eq!(
            config.history_url(&conv("g1")).unwrap().as_str(),
            "http://localhost:8000/chat/history/g1"
        );
        assert_eq!(
            config.presence_url(&conv("g1")).unwrap().as_str(),
            "http://localhost:8000/chat/onlinemembers/g1"
        );
    }

    #[test]
    fn secure_base_stays_secure() {
        let config = ClientConfig::new("https://chat.example.com/api/").unwrap();
        assert_eq!(
            config.stream_url(&conv("g1")).unwrap().as_str(),
            "wss://chat.example.com/api/chat/ws/g1"
        );
        assert_eq!(
            config.history_url(&conv("g1")).unwrap().as_str(),
            "https://chat.example.com/api/chat/history/g1"
        );
    }

    #[test]
    fn conversation_ids_are_escaped() {
        let config = ClientConfig::new("ws://localhost:8000").unwrap();
        let url = config.stream_url(&conv("team a/b")).unwrap();
        assert_eq!(url.path(), "/chat/ws/team%20a%2Fb");
    }

    #[test]
    fn rejects_unsupported_schemes() {
        assert!(matches!(ClientConfig::new("ftp://host"), Err(ClientError::InvalidUrl(_))));
        assert!(matches!(ClientConfig::new("not a url"), Err(ClientError::InvalidUrl(_))));
    }
}
