//! Fuzz target for the dispatcher state machine
//!
//! Interleaves recorded events with consumer actions in any order, including
//! orders that break the completion contract.
//!
//! # Invariants
//!
//! - Logical time never decreases and equals the largest timestamp seen
//! - Every contract breach is reported exactly once, and never stops replay
//! - The dispatch counter counts every event since the last reset

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reprise_core::{
    ENGINE_OWNER_ID, LiveOwnerInfo, OwnerTable, ReplayConfig, ReplayDispatcher, ReplayError,
};
use reprise_harness::{ScriptBuilder, ScriptOp, SimTransport, ViolationLog};

#[derive(Debug, Clone, Arbitrary)]
enum DriverOp {
    /// Dispatch one scripted event
    Event(ScriptOp),
    /// Consumer completes the oldest accepted message
    Complete,
    /// Consumer completes with nothing accepted
    SpuriousComplete,
    /// Take the pending connection id
    TakeConnectionId,
    /// Refuse upcoming messages
    Reject(u8),
    /// Start a new scheduling turn
    ResetCounter,
}

fuzz_target!(|ops: Vec<DriverOp>| {
    let transport = SimTransport::new();
    let violations = ViolationLog::new();
    let mut dispatcher =
        ReplayDispatcher::new(transport.clone(), violations.handler(), ReplayConfig::default());

    let mut owners = OwnerTable::new();
    owners.register(LiveOwnerInfo::new(1, "library", 0));
    dispatcher.set_owner_registry(Arc::new(owners));

    // Reference model
    let mut in_progress = false;
    let mut pending_connect = false;
    let mut expected_violations = 0usize;
    let mut max_time = 0u64;
    let mut count = 0u32;

    let mut script = ScriptBuilder::new(0);

    for op in ops {
        match op {
            DriverOp::Event(script_op) => {
                script.apply(&script_op);
                let Some(event) = script.drain().pop() else {
                    continue;
                };

                let time_before = dispatcher.now();
                let rejections_before = transport.rejected();
                dispatcher.dispatch(&event);
                count += 1;

                assert!(dispatcher.now() >= time_before);
                max_time = max_time.max(event.timestamp());
                assert_eq!(dispatcher.now(), max_time);

                if event.owner_id() != ENGINE_OWNER_ID
                    && event.owner_id() != 1
                    && !matches!(script_op, ScriptOp::Connect)
                {
                    expected_violations += 1;
                }
                if event.opens_operation() {
                    if in_progress {
                        expected_violations += 1;
                    }
                    in_progress = true;
                }
                match script_op {
                    ScriptOp::Connect => pending_connect = true,
                    ScriptOp::Malformed { .. } => expected_violations += 1,
                    _ => {},
                }
                if transport.rejected() > rejections_before {
                    expected_violations += 1;
                }
            },
            DriverOp::Complete => {
                if transport.complete_next().is_some() {
                    if !in_progress {
                        expected_violations += 1;
                    }
                    in_progress = false;
                }
            },
            DriverOp::SpuriousComplete => {
                transport.complete_spurious();
                if !in_progress {
                    expected_violations += 1;
                }
                in_progress = false;
            },
            DriverOp::TakeConnectionId => {
                let taken = dispatcher.take_new_connection_id();
                if pending_connect {
                    assert!(taken.is_ok());
                    if !in_progress {
                        expected_violations += 1;
                    }
                    in_progress = false;
                    pending_connect = false;
                } else {
                    assert_eq!(taken, Err(ReplayError::UnknownConnectionId));
                    expected_violations += 1;
                }
            },
            DriverOp::Reject(n) => transport.reject_next(usize::from(n % 4)),
            DriverOp::ResetCounter => {
                dispatcher.reset_counter();
                count = 0;
            },
        }

        assert_eq!(dispatcher.operation_in_progress(), in_progress);
        assert_eq!(dispatcher.dispatch_count(), count);
        assert_eq!(violations.len(), expected_violations);
    }
});
