//! Parsing of typed lines.

use huddle_core::ConversationId;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Send a message
    Message(String),
    /// Reconnect after a failure
    Retry,
    /// Hide the banner
    Dismiss,
    /// Switch conversation
    Join(ConversationId),
    /// Leave the conversation, keep running
    Leave,
    /// Exit
    Quit,
    /// Print the command list
    Help,
    /// Blank line
    Empty,
    /// Unrecognized or malformed command
    Unknown(String),
}

/// Command list printed by `/help`.
pub const HELP: &str = "\
commands:
  /retry          reconnect after a failure
  /dismiss        hide the current notice
  /join <id>      switch conversation
  /leave          leave the conversation
  /quit           exit
anything else is sent as a message (start with // to send a leading slash)";

impl Input {
    /// Parse one line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if let Some(escaped) = trimmed.strip_prefix("//") {
            return Self::Message(format!("/{escaped}"));
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match (name, argument) {
            ("retry", "") => Self::Retry,
            ("dismiss", "") => Self::Dismiss,
            ("leave", "") => Self::Leave,
            ("quit" | "exit", "") => Self::Quit,
            ("help", "") => Self::Help,
            ("join", raw) => match ConversationId::new(raw) {
                Some(conversation_id) => Self::Join(conversation_id),
                None => Self::Unknown("/join needs a conversation id".to_string()),
            },
            _ => Self::Unknown(format!("unknown command /{name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(Input::parse("  hello there "), Input::Message("  hello there ".to_string()));
    }

    #[test]
    fn commands() {
        assert_eq!(Input::parse("/retry"), Input::Retry);
        assert_eq!(Input::parse(" /quit "), Input::Quit);
        assert_eq!(Input::parse("/exit"), Input::Quit);
        assert_eq!(Input::parse("/join  team-b "), Input::Join(ConversationId::new("team-b").unwrap()));
        assert_eq!(Input::parse(""), Input::Empty);
    }

    #[test]
    fn malformed_commands_are_reported() {
        assert!(matches!(Input::parse("/join"), Input::Unknown(_)));
        assert!(matches!(Input::parse("/retry now"), Input::Unknown(_)));
        assert!(matches!(Input::parse("/shrug"), Input::Unknown(_)));
    }

    #[test]
    fn double_slash_escapes() {
        assert_eq!(Input::parse("//shrug"), Input::Message("/shrug".to_string()));
    }
}
