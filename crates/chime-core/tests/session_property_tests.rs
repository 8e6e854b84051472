//! Property-based tests for the session core
//!
//! Random operation sequences against the roster, the backoff policy and
//! the session manager, checking the invariants that must hold after every
//! step.

use chime_core::{
    create_transport_event_channel,
    credentials::{ACCOUNT_EMAIL, DEVICE_TOKEN},
    BackoffPolicy, ChannelConfig, ChimeError, ConfigPresets, ConnectionTransport, Entity,
    EntityKind, MemoryCredentialStore, MockTimeSource, RetryConfig, RetryPolicy, RetryRecord,
    Roster, ScriptProbe, ScriptedTransport, SessionManager, SessionState, Timestamp,
    TransportEvent, TransportEventReceiver, TransportScript, MAX_RETRIES,
};
use proptest::prelude::*;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Strategies
// ----------------------------------------------------------------------------

fn arb_entity_id() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-e]{1,2}").unwrap()
}

fn arb_entity() -> impl Strategy<Value = Entity> {
    (arb_entity_id(), any::<bool>()).prop_map(|(id, is_room)| {
        let name = id.to_uppercase();
        if is_room {
            Entity::room(id, name)
        } else {
            Entity::conversation(id, name)
        }
    })
}

fn arb_transport_event() -> impl Strategy<Value = TransportEvent> + Clone {
    prop_oneof![
        Just(TransportEvent::AuthenticateRequired),
        Just(TransportEvent::Connected {
            display_name: "Alice".into()
        }),
        Just(TransportEvent::Disconnected {
            reason: "dropped".into()
        }),
        Just(TransportEvent::SessionTokenChanged {
            token: "s-1".into()
        }),
        Just(TransportEvent::SessionTokenChanged {
            token: "s-2".into()
        }),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Submit,
    Cancel,
    SignOut,
    Event(TransportEvent),
    Advance(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Connect),
        3 => Just(Op::Submit),
        1 => Just(Op::Cancel),
        1 => Just(Op::SignOut),
        4 => arb_transport_event().prop_map(Op::Event),
        2 => (0u64..2_000).prop_map(Op::Advance),
    ]
}

fn arb_script() -> impl Strategy<Value = TransportScript> {
    let step = prop::collection::vec(arb_transport_event(), 0..3);
    (
        prop::collection::vec(step.clone(), 0..3),
        prop::collection::vec(step, 0..3),
    )
        .prop_map(|(connects, authenticates)| {
            let script = connects
                .into_iter()
                .fold(TransportScript::default(), TransportScript::on_connect);
            authenticates
                .into_iter()
                .fold(script, TransportScript::on_authenticate)
        })
}

// ----------------------------------------------------------------------------
// Session Harness
// ----------------------------------------------------------------------------

struct Harness {
    manager: SessionManager<MockTimeSource>,
    events: TransportEventReceiver,
    probe: ScriptProbe,
    clock: MockTimeSource,
}

impl Harness {
    fn new(script: TransportScript) -> Self {
        let store = MemoryCredentialStore::with_entries([
            (ACCOUNT_EMAIL, "alice@example.com"),
            (DEVICE_TOKEN, "device-1"),
        ]);
        let mut transport = ScriptedTransport::new(script);
        let probe = transport.probe();
        let (sender, events) = create_transport_event_channel(&ChannelConfig::default());
        transport.attach_events(sender);
        let clock = MockTimeSource::new_at(1_000);
        let manager = SessionManager::new(
            &ConfigPresets::development(),
            Box::new(store),
            Box::new(transport),
            clock.clone(),
        );
        Self {
            manager,
            events,
            probe,
            clock,
        }
    }

    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.manager.handle_event(&event);
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Connect => {
                let _ = self.manager.connect();
            }
            Op::Submit => {
                let _ = self.manager.submit_credentials("alice", "hunter2");
            }
            Op::Cancel => {
                self.manager.cancel();
            }
            Op::SignOut => {
                let _ = self.manager.sign_out();
            }
            Op::Event(event) => self.manager.handle_event(&event),
            Op::Advance(millis) => {
                self.clock.advance(millis);
                self.manager.poll_timers();
            }
        }
        self.pump();
    }
}

proptest! {
    // ------------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------------

    /// Property: rooms always render before conversations, each group in
    /// arrival order, with every id listed once
    #[test]
    fn roster_groups_keep_arrival_order(entities in prop::collection::vec(arb_entity(), 0..40)) {
        let mut roster = Roster::new();
        let mut accepted: Vec<Entity> = Vec::new();
        for entity in entities {
            let known = accepted.iter().any(|e| e.id == entity.id);
            let result = roster.on_entity_added(entity.clone());
            prop_assert_eq!(result.is_err(), known);
            if !known {
                accepted.push(entity);
            }
        }

        let expected: Vec<String> = accepted
            .iter()
            .filter(|e| e.kind == EntityKind::Room)
            .chain(accepted.iter().filter(|e| e.kind == EntityKind::Conversation))
            .map(|e| e.id.clone())
            .collect();
        let listed: Vec<String> = roster.iter_ordered().map(|e| e.entity.id.clone()).collect();
        prop_assert_eq!(listed, expected);
        prop_assert_eq!(roster.len(), accepted.len());
    }

    /// Property: re-adding a known entity never changes the roster
    #[test]
    fn roster_duplicate_is_noop(
        entities in prop::collection::vec(arb_entity(), 1..20),
        pick in any::<prop::sample::Index>(),
        renamed in "[A-Z][a-z]{0,8}",
    ) {
        let mut roster = Roster::new();
        for entity in entities.iter().cloned() {
            let _ = roster.on_entity_added(entity);
        }
        let before = roster.list_ordered();

        let duplicate = Entity {
            display_name: renamed,
            ..pick.get(&entities).clone()
        };
        prop_assert!(roster.on_entity_added(duplicate).is_err());
        prop_assert_eq!(roster.list_ordered(), before);
    }

    // ------------------------------------------------------------------------
    // Backoff
    // ------------------------------------------------------------------------

    /// Property: delays never decrease and never exceed the cap
    #[test]
    fn backoff_delays_non_decreasing(
        initial_ms in 1u64..5_000,
        max_ms in 1u64..60_000,
        multiplier in 1.0f32..4.0,
        max_retries in 0u32..10,
    ) {
        let policy = BackoffPolicy::new(RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
        });
        prop_assert!(policy.max_attempts() <= MAX_RETRIES);

        let mut record = RetryRecord::new(Timestamp::new(0));
        let mut previous = Duration::ZERO;
        for _ in 0..8 {
            record.record_failure(ChimeError::connection_failed("boom"));
            let delay = policy.next_delay(&record);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= Duration::from_millis(max_ms));
            previous = delay;
        }
        prop_assert!(!policy.should_retry(&record));
    }

    // ------------------------------------------------------------------------
    // Session Manager
    // ------------------------------------------------------------------------

    /// Property: under any sequence of calls and transport events the
    /// attempt counter stays within the retry limit and the password never
    /// leaves the manager
    #[test]
    fn session_attempts_bounded(
        script in arb_script(),
        ops in prop::collection::vec(arb_op(), 1..60),
    ) {
        let mut harness = Harness::new(script);
        for op in ops {
            harness.apply(op);

            let snapshot = harness.manager.snapshot();
            prop_assert!(snapshot.attempt() <= MAX_RETRIES);
            prop_assert!(snapshot.retry.as_ref().map_or(true, |r| !r.has_login()));
            if snapshot.state == SessionState::Idle {
                prop_assert!(harness.manager.next_deadline().is_none());
            }
        }
    }

    /// Property: connect() while a session is active changes nothing
    #[test]
    fn session_connect_idempotent_while_active(
        script in arb_script(),
        ops in prop::collection::vec(arb_op(), 0..30),
    ) {
        let mut harness = Harness::new(script);
        for op in ops {
            harness.apply(op);
        }

        let before = harness.manager.state().clone();
        prop_assume!(!before.accepts_connect());
        let connects = harness.probe.connects();
        let history = harness.manager.audit_trail(usize::MAX).len();

        prop_assert!(harness.manager.connect().is_ok());
        prop_assert_eq!(harness.manager.state(), &before);
        prop_assert_eq!(harness.probe.connects(), connects);
        prop_assert_eq!(harness.manager.audit_trail(usize::MAX).len(), history);
    }
}
