//! Property-based tests for the session state machines.
//!
//! Tests verify that invariants hold under arbitrary event sequences,
//! including stale and out-of-order transport outcomes.

mod common;

use std::{collections::HashSet, time::Duration};

use common::{Harness, conversation_id, message_frame, stored};
use huddle_core::{
    ConnectionConfig, ConnectionState, HistoryError, MessageStore, ReconnectPolicy, SessionAction,
    SessionConfig, SessionEvent,
};
use proptest::prelude::*;

/// Abstract driver operations; the harness turns them into events.
#[derive(Debug, Clone)]
enum Op {
    Open,
    /// Open reported for a generation that may be stale
    OpenStale(u8),
    Drop(u16),
    LiveMessage { id: Option<u8>, body: u8 },
    History { ok: bool, body: u8 },
    Send(u8),
    PresencePush(u8),
    Advance(u16),
    Retry,
    Teardown,
    Rejoin,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Open),
        1 => any::<u8>().prop_map(Op::OpenStale),
        2 => prop_oneof![Just(1000u16), Just(1001), Just(1006), Just(4000)].prop_map(Op::Drop),
        4 => (prop::option::of(0u8..6), 0u8..6).prop_map(|(id, body)| Op::LiveMessage { id, body }),
        2 => (any::<bool>(), 0u8..6).prop_map(|(ok, body)| Op::History { ok, body }),
        2 => (0u8..6).prop_map(Op::Send),
        1 => (0u8..10).prop_map(Op::PresencePush),
        3 => (0u16..12_000).prop_map(Op::Advance),
        1 => Just(Op::Retry),
        1 => Just(Op::Teardown),
        1 => Just(Op::Rejoin),
    ]
}

fn run(h: &mut Harness, op: &Op) {
    match op {
        Op::Open => {
            if let Some(generation) = h.last_connect() {
                h.apply(SessionEvent::TransportOpened { generation });
            }
        },
        Op::OpenStale(back) => {
            let generation = h.session.connection().generation().saturating_sub(u64::from(*back));
            h.apply(SessionEvent::TransportOpened { generation });
        },
        Op::Drop(code) => {
            h.drop_stream(*code);
        },
        Op::LiveMessage { id, body } => {
            let id = id.map(|n| format!("m{n}"));
            h.receive(message_frame(id.as_deref(), "u2", &format!("body {body}")));
        },
        Op::History { ok, body } => {
            if let Some(epoch) = h.last_history_epoch() {
                let result = if *ok {
                    Ok(vec![stored("g1", Some(&format!("m{body}")), "u2", &format!("body {body}"))])
                } else {
                    Err(HistoryError::Unavailable("down".into()))
                };
                h.apply(SessionEvent::HistoryLoaded { epoch, result });
            }
        },
        Op::Send(body) => {
            let _ = h.try_send(&format!("mine {body}"));
        },
        Op::PresencePush(count) => {
            h.receive(serde_json::json!({"type": "presence", "count": count}));
        },
        Op::Advance(ms) => {
            h.advance(Duration::from_millis(u64::from(*ms)));
        },
        Op::Retry => {
            h.apply(SessionEvent::Retry);
        },
        Op::Teardown => {
            h.apply(SessionEvent::Teardown);
        },
        Op::Rejoin => {
            h.apply(SessionEvent::Teardown);
            h.apply(SessionEvent::ConversationSelected(conversation_id("g1")));
        },
    }
}

fn check_invariants(h: &Harness, last_generation: u64) -> Result<(), TestCaseError> {
    let snapshot = h.session.snapshot();
    let ids: HashSet<_> = snapshot.iter().map(|m| m.id.clone()).collect();
    prop_assert_eq!(ids.len(), snapshot.len(), "duplicate ids in log");

    let generation = h.session.connection().generation();
    prop_assert!(generation >= last_generation, "generation went backwards");

    let state = h.session.state();
    if state.is_live() {
        prop_assert!(h.session.connection().target().is_some());
    }
    if let ConnectionState::Failed { attempts } = state {
        prop_assert_eq!(*attempts, h.session.connection().config().reconnect.ceiling());
    }
    if *state != ConnectionState::Open {
        prop_assert!(h.session.pending().is_empty(), "pending send outlived its stream");
        prop_assert_eq!(h.session.presence(), 0);
    }
    Ok(())
}

proptest! {
    #[test]
    fn invariants_hold_under_arbitrary_events(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut h = Harness::new();
        h.join("u1", "g1");

        let mut last_generation = h.session.connection().generation();
        for op in &ops {
            run(&mut h, op);
            check_invariants(&h, last_generation)?;
            last_generation = h.session.connection().generation();
        }
    }

    #[test]
    fn at_most_one_identify_per_open(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut h = Harness::new();
        h.join("u1", "g1");
        for op in &ops {
            run(&mut h, op);
        }

        let mut identified = HashSet::new();
        for action in &h.actions {
            if let SessionAction::SendFrame {
                generation,
                frame: huddle_proto::OutboundFrame::Identify { .. },
            } = action
            {
                prop_assert!(identified.insert(*generation), "second identify on one stream");
            }
        }
    }

    #[test]
    fn reconnect_ceiling_is_exact(max_attempts in 1u32..8) {
        let config = SessionConfig {
            connection: ConnectionConfig {
                reconnect: ReconnectPolicy { max_attempts, ..ReconnectPolicy::default() },
                ..ConnectionConfig::default()
            },
            presence_poll_interval: None,
        };
        let mut h = Harness::with_config(config);
        h.join("u1", "g1");
        h.open();

        for _ in 0..max_attempts + 3 {
            h.drop_stream(1006);
            h.advance(Duration::from_secs(30));
        }

        prop_assert_eq!(h.state(), ConnectionState::Failed { attempts: max_attempts });
        // Initial connect plus one per retry allowed below the ceiling
        prop_assert_eq!(h.connects(), max_attempts as usize);
    }

    #[test]
    fn store_keeps_first_occurrence_order(ids in prop::collection::vec(0u8..10, 0..50)) {
        let mut store = MessageStore::new();
        let mut expected = Vec::new();
        for id in &ids {
            let key = format!("m{id}");
            if !expected.contains(&key) {
                expected.push(key.clone());
            }
            store.merge(stored("g1", Some(&key), "u2", "body"));
        }

        let actual: Vec<String> = store.snapshot().iter().map(|m| m.id.to_string()).collect();
        prop_assert_eq!(actual, expected);
    }
}
