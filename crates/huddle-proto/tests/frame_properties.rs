//! Property-based tests for frame decoding.
//!
//! The stream is untrusted input: decoding must never panic, and anything it
//! accepts as a valid message must satisfy the documented field constraints.

use huddle_proto::{InboundFrame, MAX_BODY_CHARS, OutboundFrame, timestamp};
use proptest::prelude::*;

/// Strategy for plausible-looking but arbitrary JSON frame text.
fn frame_like_text() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("message"), Just("presence"), Just("identify"), Just("typing")],
        prop::option::of("[a-z0-9]{0,8}"),
        "[a-z0-9 ]{0,12}",
        prop::option::of(any::<i64>()),
    )
        .prop_map(|(kind, id, body, count)| {
            let mut value = serde_json::json!({ "type": kind, "user": "u1", "message": body });
            if let Some(id) = id {
                value["id"] = serde_json::Value::String(id);
            }
            if let Some(count) = count {
                value["count"] = serde_json::Value::from(count);
            }
            value.to_string()
        })
}

proptest! {
    #[test]
    fn parse_never_panics_on_arbitrary_text(text in any::<String>()) {
        let _ = InboundFrame::parse(&text);
    }

    #[test]
    fn parse_never_panics_on_frame_like_json(text in frame_like_text()) {
        let _ = InboundFrame::parse(&text);
    }

    #[test]
    fn validated_messages_respect_body_limits(
        body in ".{0,1100}",
        user in "[a-z0-9]{0,6}",
    ) {
        let value = serde_json::json!({
            "type": "message",
            "user": user,
            "message": body,
            "timestamp": "2024-01-01T00:00:00Z",
        });

        if let Ok(InboundFrame::Message(frame)) = InboundFrame::parse(&value.to_string()) {
            if frame.validate().is_ok() {
                prop_assert!(!frame.user.trim().is_empty());
                prop_assert!(!frame.message.trim().is_empty());
                prop_assert!(frame.message.chars().count() <= MAX_BODY_CHARS);
            }
        }
    }

    #[test]
    fn outbound_timestamps_parse_back(secs in 0i64..4_000_000_000) {
        let at = chrono::DateTime::from_timestamp(secs, 0).unwrap();
        let OutboundFrame::Message { timestamp: raw, .. } =
            OutboundFrame::message("u1", "Alice", "hi", at)
        else {
            unreachable!()
        };
        prop_assert_eq!(timestamp::parse(&raw).unwrap(), at);
    }
}
