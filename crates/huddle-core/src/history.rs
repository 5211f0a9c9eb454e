//! Initial history load.
//!
//! [`HistoryLoader`] reads the stored messages of a conversation through a
//! [`HistorySource`] and normalizes them. Records that fail validation are
//! skipped, not fatal: one corrupt row must not hide the rest of the history.
//! A failed read is surfaced as [`HistoryError`]; the session then shows
//! [`fallback`] instead.

use std::future::Future;

use chrono::{DateTime, Utc};
use huddle_proto::HistoryRecord;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    context::{ConversationId, Identity},
    message::Message,
};

/// Tag of the notice shown when history could not be loaded.
pub const HISTORY_UNAVAILABLE_TAG: &str = "history-unavailable";

/// Text of that notice.
pub const HISTORY_UNAVAILABLE_TEXT: &str = "Could not load message history.";

/// History read failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// No conversation to load
    #[error("conversation id is empty")]
    EmptyConversation,

    /// Request failed, timed out or returned an unusable body
    #[error("history unavailable: {0}")]
    Unavailable(String),
}

/// Raw history read.
pub trait HistorySource: Send + Sync {
    /// Stored records of `conversation_id`, oldest first.
    fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<Vec<HistoryRecord>, HistoryError>> + Send;
}

/// Loads and normalizes conversation history.
#[derive(Debug, Clone)]
pub struct HistoryLoader<S> {
    source: S,
}

impl<S: HistorySource> HistoryLoader<S> {
    /// Loader reading from `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Load the history of `conversation_id` for `identity`.
    ///
    /// Returns messages in backend order. Whether each one is the user's own
    /// is derived later from `identity` via [`Message::is_self`].
    ///
    /// # Errors
    ///
    /// - `HistoryError::EmptyConversation` for a blank conversation id
    /// - `HistoryError::Unavailable` if the source fails
    pub async fn load(
        &self,
        conversation_id: &str,
        identity: &Identity,
    ) -> Result<Vec<Message>, HistoryError> {
        let conversation_id =
            ConversationId::new(conversation_id).ok_or(HistoryError::EmptyConversation)?;

        let records = self.source.fetch_history(&conversation_id).await?;
        let messages = normalize(&conversation_id, &records);
        debug!(
            conversation = %conversation_id,
            user = %identity.user_id,
            records = records.len(),
            kept = messages.len(),
            "history loaded"
        );
        Ok(messages)
    }
}

/// Normalize records, skipping the ones that fail validation.
pub fn normalize(conversation_id: &ConversationId, records: &[HistoryRecord]) -> Vec<Message> {
    records
        .iter()
        .filter_map(|record| match Message::from_record(conversation_id, record) {
            Ok(message) => Some(message),
            Err(error) => {
                warn!(conversation = %conversation_id, %error, "skipping invalid history record");
                None
            },
        })
        .collect()
}

/// What to show when history could not be loaded: a single system notice.
pub fn fallback(conversation_id: &ConversationId, at: DateTime<Utc>) -> Vec<Message> {
    vec![Message::system(conversation_id, HISTORY_UNAVAILABLE_TAG, HISTORY_UNAVAILABLE_TEXT, at)]
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        pin::pin,
        task::{Context, Poll, Waker},
    };

    use chrono::TimeZone;

    use super::*;
    use crate::message::MessageId;

    struct Fixed(Result<Vec<HistoryRecord>, HistoryError>);

    impl HistorySource for Fixed {
        fn fetch_history(
            &self,
            _conversation_id: &ConversationId,
        ) -> impl Future<Output = Result<Vec<HistoryRecord>, HistoryError>> + Send {
            std::future::ready(self.0.clone())
        }
    }

    /// Poll a future that never waits.
    fn ready<F: Future>(future: F) -> F::Output {
        let mut future = pin!(future);
        match future.as_mut().poll(&mut Context::from_waker(Waker::noop())) {
            Poll::Ready(output) => output,
            Poll::Pending => panic!("future was not ready"),
        }
    }

    fn record(id: Option<&str>, user: &str, body: &str) -> HistoryRecord {
        HistoryRecord {
            id: id.map(str::to_string),
            user: user.to_string(),
            username: Some("Alice".to_string()),
            message: body.to_string(),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn loads_and_normalizes_in_order() {
        let loader = HistoryLoader::new(Fixed(Ok(vec![
            record(Some("1"), "u1", "first"),
            record(Some("2"), "u2", "second"),
        ])));

        let messages = ready(loader.load("g1", &Identity::new("u1", "Alice"))).unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert!(messages[0].is_self(&Identity::new("u1", "Alice")));
    }

    #[test]
    fn invalid_records_are_skipped() {
        let loader = HistoryLoader::new(Fixed(Ok(vec![
            record(Some("1"), "", "no sender"),
            record(Some("2"), "u2", "ok"),
        ])));

        let messages = ready(loader.load("g1", &Identity::new("u1", "Alice"))).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Server("2".to_string()));
    }

    #[test]
    fn blank_conversation_is_rejected() {
        let loader = HistoryLoader::new(Fixed(Ok(vec![])));
        assert_eq!(
            ready(loader.load("  ", &Identity::new("u1", "Alice"))),
            Err(HistoryError::EmptyConversation)
        );
    }

    #[test]
    fn source_failure_propagates() {
        let loader = HistoryLoader::new(Fixed(Err(HistoryError::Unavailable("503".into()))));
        assert!(matches!(
            ready(loader.load("g1", &Identity::new("u1", "Alice"))),
            Err(HistoryError::Unavailable(_))
        ));
    }

    #[test]
    fn fallback_is_one_system_notice() {
        let conv = ConversationId::new("g1").unwrap();
        let notice = fallback(&conv, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(notice.len(), 1);
        assert_eq!(notice[0].id, MessageId::System(HISTORY_UNAVAILABLE_TAG));
        assert_eq!(notice[0].body, HISTORY_UNAVAILABLE_TEXT);
    }
}
