//! Incremental text rendering of session views.

use std::collections::HashSet;

use huddle_client::{Banner, SessionView};
use huddle_core::{ConversationId, Message, MessageId};

/// Turns successive views into the lines that changed.
#[derive(Debug, Default)]
pub struct Renderer {
    status: Option<String>,
    banner: Option<Banner>,
    conversation_id: Option<ConversationId>,
    /// Number of log entries printed and the id of the last one
    shown: usize,
    last_shown: Option<MessageId>,
    announced: HashSet<u64>,
}

impl Renderer {
    /// Lines to print for `view`, given everything printed so far.
    pub fn render(&mut self, view: &SessionView) -> String {
        let mut out = String::new();

        if view.conversation_id != self.conversation_id {
            if let Some(conversation_id) = &view.conversation_id {
                out.push_str(&format!("== {conversation_id}\n"));
            }
            self.conversation_id = view.conversation_id.clone();
        }

        let status = view.status_line();
        if self.status.as_deref() != Some(status.as_str()) {
            out.push_str(&format!("-- {status}\n"));
            self.status = Some(status);
        }

        if view.banner != self.banner {
            if let Some(banner) = &view.banner {
                out.push_str(&format!("!! {banner}\n"));
            }
            self.banner = view.banner.clone();
        }

        let start = self.first_unshown(view);
        for message in &view.messages[start..] {
            out.push_str(&line(view, message));
        }
        self.shown = view.messages.len();
        self.last_shown = view.messages.last().map(|message| message.id.clone());

        for pending in &view.pending {
            if self.announced.insert(pending.local_id) {
                out.push_str(&format!("   sending: {}\n", pending.body));
            }
        }
        self.announced.retain(|id| view.pending.iter().any(|pending| pending.local_id == *id));

        out
    }

    /// Index of the first entry not printed yet; 0 when the log was replaced.
    fn first_unshown(&self, view: &SessionView) -> usize {
        let Some(last) = &self.last_shown else {
            return 0;
        };
        let still_there = self
            .shown
            .checked_sub(1)
            .and_then(|index| view.messages.get(index))
            .is_some_and(|message| &message.id == last);
        if still_there { self.shown } else { 0 }
    }
}

fn line(view: &SessionView, message: &Message) -> String {
    if message.is_system() {
        return format!("*  {}\n", message.body);
    }
    let sender = if view.is_self(message) { "you" } else { message.sender_display_name.as_str() };
    format!("[{}] {sender}: {}\n", message.sent_at.format("%H:%M"), message.body)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use huddle_core::{ConnectionState, Identity};
    use huddle_proto::HistoryRecord;

    use super::*;

    fn conv() -> ConversationId {
        ConversationId::new("g1").unwrap()
    }

    fn message(id: &str, user: &str, body: &str) -> Message {
        let record = HistoryRecord {
            id: Some(id.to_string()),
            user: user.to_string(),
            username: Some(user.to_uppercase()),
            message: body.to_string(),
            timestamp: Some("2024-01-01T09:30:00Z".to_string()),
        };
        Message::from_record(&conv(), &record).unwrap()
    }

    fn view(messages: Vec<Message>) -> SessionView {
        SessionView {
            state: ConnectionState::Open,
            messages: Arc::new(messages),
            presence: 2,
            identity: Some(Identity::new("u1", "Alice")),
            conversation_id: Some(conv()),
            max_attempts: 5,
            ..SessionView::default()
        }
    }

    #[test]
    fn prints_only_new_messages() {
        let mut renderer = Renderer::default();

        let first = renderer.render(&view(vec![message("m1", "u2", "hi")]));
        assert_eq!(first, "== g1\n-- Connected, 2 online\n[09:30] U2: hi\n");

        let second = renderer.render(&view(vec![message("m1", "u2", "hi"), message("m2", "u1", "hey")]));
        assert_eq!(second, "[09:30] you: hey\n");

        assert_eq!(renderer.render(&view(vec![message("m1", "u2", "hi"), message("m2", "u1", "hey")])), "");
    }

    #[test]
    fn replaced_log_is_printed_again() {
        let mut renderer = Renderer::default();
        renderer.render(&view(vec![message("m1", "u2", "old")]));

        let out = renderer.render(&view(vec![message("m7", "u3", "new")]));
        assert_eq!(out, "[09:30] U3: new\n");
    }

    #[test]
    fn system_notices_and_banners() {
        let mut renderer = Renderer::default();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut current = view(vec![Message::system(&conv(), "history-unavailable", "Could not load message history.", at)]);
        current.banner = Some(Banner::HistoryUnavailable);

        let out = renderer.render(&current);
        assert!(out.contains("!! Could not load message history.\n"));
        assert!(out.ends_with("*  Could not load message history.\n"));
    }

    #[test]
    fn status_changes_are_announced_once() {
        let mut renderer = Renderer::default();
        let mut current = view(Vec::new());
        current.state = ConnectionState::Reconnecting { attempt: 2 };

        assert!(renderer.render(&current).contains("-- Reconnecting (2/5)\n"));
        assert!(!renderer.render(&current).contains("Reconnecting"));
    }
}
