//! Property tests for driven replays.
//!
//! A consumer that honours the completion contract must never trip the
//! sequencer, whatever the script. The clock must always end at the largest
//! recorded timestamp, and the same seed must give the same run.

use std::sync::Arc;

use proptest::prelude::*;
use reprise_core::{ErrorKind, LiveOwnerInfo, OwnerTable, ReplayConfig, ReplayEvent};
use reprise_harness::{CompletionPolicy, ReplayDriver, ScriptBuilder, ScriptOp};

fn script_op() -> impl Strategy<Value = ScriptOp> {
    prop_oneof![
        Just(ScriptOp::Connect),
        (0u8..4, 1u8..6, any::<bool>(), 0u8..8).prop_map(|(owner, connection, resend, fields)| {
            ScriptOp::Message { owner, connection, resend, fields }
        }),
        (0u8..4, any::<u16>())
            .prop_map(|(owner, stale_by)| ScriptOp::Heartbeat { owner, stale_by }),
        (0u32..10_000).prop_map(|nanos| ScriptOp::Advance { nanos }),
    ]
}

fn policy() -> impl Strategy<Value = CompletionPolicy> {
    prop_oneof![Just(CompletionPolicy::Immediate), Just(CompletionPolicy::Deferred)]
}

fn build(ops: &[ScriptOp]) -> Vec<ReplayEvent> {
    let mut script = ScriptBuilder::new(1_000_000).with_padding(32);
    for op in ops {
        script.apply(op);
    }
    script.build()
}

/// Driver with owners 1 to 3 registered alongside the engine.
fn driver(policy: CompletionPolicy, seed: u64, fragment_limit: u32) -> ReplayDriver {
    let config = ReplayConfig::default().with_fragment_limit(fragment_limit);
    let mut driver = ReplayDriver::new(config, policy, seed);

    let mut owners = OwnerTable::new();
    for owner_id in 1..=3 {
        owners.register(LiveOwnerInfo::new(owner_id, format!("library-{owner_id}"), 0));
    }
    driver.set_owner_registry(Arc::new(owners));
    driver
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: honouring the completion contract never trips the sequencer.
    #[test]
    fn prop_contract_honouring_replay_is_clean(
        ops in prop::collection::vec(script_op(), 0..80),
        policy in policy(),
        seed in any::<u64>(),
        fragment_limit in 1u32..16,
    ) {
        let events = build(&ops);
        let mut driver = driver(policy, seed, fragment_limit);

        let report = driver.run(&events);

        prop_assert!(report.is_clean(), "violations: {:?}", report.violations);
        prop_assert_eq!(report.dispatched, events.len());
        prop_assert!(report.over_limit.is_empty());
        prop_assert!(!driver.dispatcher().operation_in_progress());
        prop_assert_eq!(driver.transport().awaiting_completion(), 0);
    }

    /// Property: the clock ends at the largest recorded timestamp.
    #[test]
    fn prop_final_time_is_max_timestamp(
        ops in prop::collection::vec(script_op(), 1..80),
        seed in any::<u64>(),
    ) {
        let events = build(&ops);
        let mut driver = driver(CompletionPolicy::Deferred, seed, 10);

        let report = driver.run(&events);

        let expected = events
            .iter()
            .map(ReplayEvent::timestamp)
            .max()
            .unwrap_or_default()
            .max(ReplayConfig::default().initial_time_ns);
        prop_assert_eq!(report.final_time, expected);
    }

    /// Property: unregistered owners are reported once per event, never
    /// more, and never stop the replay.
    #[test]
    fn prop_unknown_owners_reported_per_event(
        ops in prop::collection::vec(script_op(), 0..60),
        seed in any::<u64>(),
    ) {
        let events = build(&ops);
        let config = ReplayConfig::default();
        let mut driver = ReplayDriver::new(config, CompletionPolicy::Immediate, seed);
        driver.set_owner_registry(Arc::new(OwnerTable::new()));

        let report = driver.run(&events);

        // ORACLE: every message or heartbeat with a non-engine owner
        let expected = events
            .iter()
            .filter(|e| !matches!(e, ReplayEvent::Connect(_)) && e.owner_id() != 0)
            .count();
        prop_assert_eq!(report.violations.len(), expected);
        prop_assert!(report
            .violations
            .iter()
            .all(|e| e.kind() == ErrorKind::InvariantViolation));
        prop_assert_eq!(report.dispatched, events.len());
    }

    /// Property: same seed, same script, same report.
    #[test]
    fn prop_replay_is_deterministic(
        ops in prop::collection::vec(script_op(), 0..60),
        seed in any::<u64>(),
        skip_percent in 0u8..=100,
    ) {
        let events = build(&ops);
        let policy = CompletionPolicy::Lagging { skip_percent };

        let first = driver(policy, seed, 8).run(&events);
        let second = driver(policy, seed, 8).run(&events);

        prop_assert_eq!(first, second);
    }
}
