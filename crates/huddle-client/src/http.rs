//! HTTP collaborator serving history and presence reads.

use std::{future::Future, sync::Arc};

use huddle_core::{ConversationId, HistoryError, HistorySource, PresenceError, PresenceSource};
use huddle_proto::{HistoryRecord, PresenceResponse};
use reqwest::{Client, Url};
use tracing::debug;

use crate::{
    config::{API_KEY_HEADER, ClientConfig},
    error::ClientError,
};

/// History and presence over HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpCollaborator {
    /// Build the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Http` if the TLS backend cannot be initialized
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>, String> {
        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("{url} returned {status}"));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        debug!(%url, len = body.len(), "collaborator response");
        Ok(body.to_vec())
    }
}

impl HistorySource for HttpCollaborator {
    fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<Vec<HistoryRecord>, HistoryError>> + Send {
        async move {
            let url = self
                .config
                .history_url(conversation_id)
                .map_err(|e| HistoryError::Unavailable(e.to_string()))?;
            let body = self.get(url).await.map_err(HistoryError::Unavailable)?;
            HistoryRecord::decode_list(&body).map_err(|e| HistoryError::Unavailable(e.to_string()))
        }
    }
}

impl PresenceSource for HttpCollaborator {
    fn online_count(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<u32, PresenceError>> + Send {
        async move {
            let url = self
                .config
                .presence_url(conversation_id)
                .map_err(|e| PresenceError::Unavailable(e.to_string()))?;
            let body = self.get(url).await.map_err(PresenceError::Unavailable)?;
            let response = PresenceResponse::decode(&body)
                .map_err(|e| PresenceError::Unavailable(e.to_string()))?;
            Ok(response.online)
        }
    }
}
