//! Dispatcher behaviour against a recording transport.
//!
//! Covers owner validation, the connect round trip, clock behaviour across
//! event kinds and the dispatch-rate probe.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use reprise_core::{
    CompletionHandle, ConnectEvent, ENGINE_OWNER_ID, EnqueuedMessage, EpochClock, ErrorKind,
    HeartbeatEvent, MessageEvent, OwnerId, ReplayConfig, ReplayDispatcher, ReplayError,
    ReplayEvent, ReplayTransport,
};

/// Transport that accepts everything and completes on demand.
#[derive(Default)]
struct TestTransport {
    forwarded: Vec<EnqueuedMessage>,
    connects: Vec<ConnectEvent>,
    completion: Option<CompletionHandle>,
}

impl TestTransport {
    fn complete(&self) {
        self.completion.as_ref().expect("completion registered").complete();
    }
}

impl ReplayTransport for TestTransport {
    fn enqueue_message(&mut self, message: EnqueuedMessage) -> bool {
        self.forwarded.push(message);
        true
    }

    fn enqueue_connect(&mut self, connect: &ConnectEvent) {
        self.connects.push(connect.clone());
    }

    fn register_completion(&mut self, handle: CompletionHandle) {
        self.completion = Some(handle);
    }
}

type Violations = Arc<Mutex<Vec<ReplayError>>>;

fn setup() -> (Violations, ReplayDispatcher<TestTransport>) {
    let violations = Violations::default();
    let sink = Arc::clone(&violations);
    let dispatcher = ReplayDispatcher::new(
        TestTransport::default(),
        Arc::new(move |e: &ReplayError| sink.lock().expect("lock").push(e.clone())),
        ReplayConfig::default(),
    );
    (violations, dispatcher)
}

fn install_owner_seven(dispatcher: &mut ReplayDispatcher<TestTransport>) {
    let owners: HashMap<OwnerId, &'static str> = [(7, "valid")].into_iter().collect();
    dispatcher.set_owner_registry(Arc::new(owners));
}

fn message(timestamp: u64, owner_id: OwnerId) -> MessageEvent {
    let mut framed = b"HDR00000".to_vec();
    framed.extend_from_slice(b"8=FIX.4.4\x019=5\x0135=D\x01");

    MessageEvent {
        timestamp,
        owner_id,
        connection_id: 3,
        message_type: u64::from(b'D'),
        initial_offset: 8,
        offset: 8,
        length: framed.len() - 8,
        buffer: Bytes::from(framed),
    }
}

fn connect(timestamp: u64, connection_id: u64) -> ConnectEvent {
    ConnectEvent {
        timestamp,
        owner_id: ENGINE_OWNER_ID,
        connection_id,
        address: "192.168.0.10:9880".to_string(),
        payload: Bytes::from_static(b"connect"),
    }
}

#[test]
fn known_and_engine_owners_are_valid() {
    let (violations, mut dispatcher) = setup();
    install_owner_seven(&mut dispatcher);

    dispatcher.on_message(&message(1, 7));
    dispatcher.transport().complete();
    dispatcher.on_message(&message(2, ENGINE_OWNER_ID));
    dispatcher.transport().complete();

    assert!(violations.lock().expect("lock").is_empty());
    assert_eq!(dispatcher.transport().forwarded.len(), 2);
}

#[test]
fn unknown_owner_reported_once_and_forwarded() {
    let (violations, mut dispatcher) = setup();
    install_owner_seven(&mut dispatcher);

    dispatcher.on_message(&message(1, 99));

    let seen = violations.lock().expect("lock");
    assert_eq!(*seen, vec![ReplayError::UnknownOwner { owner_id: 99, known: vec![7] }]);
    assert_eq!(seen[0].kind(), ErrorKind::InvariantViolation);
    assert_eq!(dispatcher.transport().forwarded.len(), 1);
}

#[test]
fn unknown_heartbeat_owner_reported() {
    let (violations, mut dispatcher) = setup();
    install_owner_seven(&mut dispatcher);

    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 5, owner_id: 12 });

    assert_eq!(violations.lock().expect("lock").len(), 1);
    assert_eq!(dispatcher.now(), 5);
}

#[test]
fn connect_round_trip() {
    let (violations, mut dispatcher) = setup();

    dispatcher.on_connect(&connect(10, 1234));
    assert!(dispatcher.operation_in_progress());
    assert_eq!(dispatcher.transport().connects[0].payload.as_ref(), b"connect");

    assert_eq!(dispatcher.take_new_connection_id(), Ok(1234));
    assert!(!dispatcher.operation_in_progress());
    assert!(violations.lock().expect("lock").is_empty());

    // Nothing pending any more: fatal usage error, reported and returned
    let err = dispatcher.take_new_connection_id().expect_err("no connect pending");
    assert_eq!(err, ReplayError::UnknownConnectionId);
    assert!(err.is_fatal());
    assert_eq!(*violations.lock().expect("lock"), vec![ReplayError::UnknownConnectionId]);
}

#[test]
fn stale_message_timestamp_does_not_regress_clock() {
    let (_, mut dispatcher) = setup();

    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 100, owner_id: ENGINE_OWNER_ID });
    dispatcher.on_message(&message(90, ENGINE_OWNER_ID));

    assert_eq!(dispatcher.now(), 100);
    assert_eq!(dispatcher.clock().to_millis().time(), 0);
}

#[test]
fn rate_probe_reports_when_limit_exceeded() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let (_, dispatcher) = setup();
    let mut dispatcher =
        dispatcher.with_count_observer(move |count| sink.lock().expect("lock").push(count));

    dispatcher.reset_counter();
    for t in 0..5 {
        dispatcher.on_message(&message(t, ENGINE_OWNER_ID));
        dispatcher.transport().complete();
    }

    assert!(dispatcher.check_counter(3));
    assert_eq!(*observed.lock().expect("lock"), vec![5]);

    assert!(!dispatcher.check_counter(10));
    assert_eq!(observed.lock().expect("lock").len(), 1);

    dispatcher.reset_counter();
    assert_eq!(dispatcher.dispatch_count(), 0);
    assert!(!dispatcher.check_counter(3));
}

#[test]
fn count_observer_can_be_replaced_and_cleared() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let (_, mut dispatcher) = setup();

    let sink = Arc::clone(&first);
    dispatcher.set_count_observer(Some(Arc::new(move |count: u32| {
        sink.lock().expect("lock").push(count);
    })));
    for t in 0..3 {
        dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: t, owner_id: ENGINE_OWNER_ID });
    }
    assert!(dispatcher.check_counter(2));

    let sink = Arc::clone(&second);
    dispatcher.set_count_observer(Some(Arc::new(move |count: u32| {
        sink.lock().expect("lock").push(count);
    })));
    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 3, owner_id: ENGINE_OWNER_ID });
    assert!(dispatcher.check_counter(2));

    // Cleared: the probe still reports through its return value
    dispatcher.set_count_observer(None);
    assert!(dispatcher.check_counter(2));

    assert_eq!(*first.lock().expect("lock"), vec![3]);
    assert_eq!(*second.lock().expect("lock"), vec![4]);
}

#[test]
fn clock_starts_at_configured_time() {
    let config = ReplayConfig::default().with_initial_time_ns(7_000_000).with_fragment_limit(3);
    let mut dispatcher =
        ReplayDispatcher::new(TestTransport::default(), Arc::new(|_: &ReplayError| {}), config);

    assert_eq!(dispatcher.now(), 7_000_000);
    assert_eq!(dispatcher.config().fragment_limit, 3);
    assert_eq!(dispatcher.config().initial_time_ns, 7_000_000);

    // Recorded timestamps behind the start time leave it in place
    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 10, owner_id: ENGINE_OWNER_ID });
    assert_eq!(dispatcher.now(), 7_000_000);
    assert_eq!(dispatcher.clock().to_millis().time(), 7);

    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 9_000_000, owner_id: ENGINE_OWNER_ID });
    assert_eq!(dispatcher.now(), 9_000_000);
}

#[test]
fn violations_never_reset_clock_or_counter() {
    let (violations, mut dispatcher) = setup();

    dispatcher.on_message(&message(50, 77));
    dispatcher.on_message(&message(60, ENGINE_OWNER_ID));
    let _ = dispatcher.take_new_connection_id();

    assert_eq!(violations.lock().expect("lock").len(), 3);
    assert_eq!(dispatcher.now(), 60);
    assert_eq!(dispatcher.dispatch_count(), 2);
}

#[test]
fn dispatch_routes_by_kind() {
    let (violations, mut dispatcher) = setup();

    let events: Vec<ReplayEvent> = vec![
        connect(1, 9).into(),
        HeartbeatEvent { timestamp: 2, owner_id: ENGINE_OWNER_ID }.into(),
    ];
    for event in &events {
        dispatcher.dispatch(event);
    }
    assert_eq!(dispatcher.take_new_connection_id(), Ok(9));

    dispatcher.dispatch(&ReplayEvent::from(message(3, ENGINE_OWNER_ID)));
    dispatcher.transport().complete();

    assert_eq!(dispatcher.dispatch_count(), 3);
    assert_eq!(dispatcher.transport().connects.len(), 1);
    assert_eq!(dispatcher.transport().forwarded.len(), 1);
    assert!(!dispatcher.operation_in_progress());
    assert!(violations.lock().expect("lock").is_empty());
}

#[test]
fn forwarded_window_covers_header_and_content() {
    let (_, mut dispatcher) = setup();
    let event = message(1, ENGINE_OWNER_ID);

    dispatcher.on_message(&event);

    let forwarded = &dispatcher.transport().forwarded[0];
    assert_eq!(forwarded.framed_bytes(), event.buffer);
    assert_eq!(&forwarded.framed_bytes()[..8], b"HDR00000");
    assert_eq!(forwarded.content().as_ref(), b"8=FIX.4.4\x019=5\x0135=D\x01");
}

#[test]
fn shared_clock_is_observed_downstream() {
    let clock = reprise_core::ReplayClock::new(1_000);
    let session_view = clock.clone();
    let mut dispatcher = ReplayDispatcher::with_clock(
        TestTransport::default(),
        clock,
        Arc::new(reprise_core::LoggingErrorHandler),
        ReplayConfig::default(),
    );

    dispatcher.on_heartbeat(&HeartbeatEvent { timestamp: 5_000_000, owner_id: 0 });
    assert_eq!(session_view.current(), 5_000_000);
}
