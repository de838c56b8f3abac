//! Seeded replay driver.
//!
//! Plays a script through a [`ReplayDispatcher`] the way the engine's duty
//! cycle does: in turns of at most `fragment_limit` events, resetting the
//! rate probe before each turn and checking it after. Between events the
//! driver plays the downstream consumer, completing forwarded messages
//! according to a [`CompletionPolicy`]. All randomness comes from a seeded
//! `ChaCha8Rng`, so the same seed gives the same run.

use std::sync::{Arc, Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reprise_core::{
    ConnectionId, DispatchOutcome, LogicalTime, OwnerRegistry, ReplayConfig, ReplayDispatcher,
    ReplayError, ReplayEvent,
};

use crate::{sim_transport::SimTransport, violation_log::ViolationLog};

/// When the simulated consumer completes forwarded messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Complete each message as soon as it is accepted
    Immediate,
    /// Hold completions, flushing at random heartbeats and always before the
    /// next operation opens
    Deferred,
    /// Like `Deferred`, but skip the flush before an operation with the
    /// given percentage chance
    Lagging {
        /// Chance of skipping a flush, 0 to 100
        skip_percent: u8,
    },
}

/// Outcome of a driven replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Events handed to the dispatcher
    pub dispatched: usize,
    /// Messages and connects forwarded downstream
    pub forwarded: usize,
    /// Messages refused downstream
    pub rejected: usize,
    /// Messages with unusable offsets
    pub dropped: usize,
    /// Heartbeats
    pub observed: usize,
    /// Connection ids taken after each connect, in order
    pub connections: Vec<ConnectionId>,
    /// Scheduling turns run
    pub turns: usize,
    /// Dispatch counts reported by the rate probe
    pub over_limit: Vec<u32>,
    /// Logical time after the last event
    pub final_time: LogicalTime,
    /// Everything reported to the error channel, in order
    pub violations: Vec<ReplayError>,
}

impl ReplayReport {
    /// Returns true if nothing was reported to the error channel.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        self.dispatched += 1;
        match outcome {
            DispatchOutcome::Forwarded => self.forwarded += 1,
            DispatchOutcome::Rejected => self.rejected += 1,
            DispatchOutcome::Dropped => self.dropped += 1,
            DispatchOutcome::Observed => self.observed += 1,
        }
    }
}

/// Drives scripts through a dispatcher backed by a [`SimTransport`].
pub struct ReplayDriver {
    dispatcher: ReplayDispatcher<SimTransport>,
    transport: SimTransport,
    violations: ViolationLog,
    over_limit: Arc<Mutex<Vec<u32>>>,
    policy: CompletionPolicy,
    rng: ChaCha8Rng,
    turn_size: usize,
}

impl ReplayDriver {
    /// Create a driver with a fresh dispatcher.
    ///
    /// Turns are `config.fragment_limit` events long.
    pub fn new(config: ReplayConfig, policy: CompletionPolicy, seed: u64) -> Self {
        let transport = SimTransport::new();
        let violations = ViolationLog::new();
        let over_limit = Arc::new(Mutex::new(Vec::new()));
        let turn_size = config.fragment_limit.max(1) as usize;

        let sink = Arc::clone(&over_limit);
        let dispatcher = ReplayDispatcher::new(transport.clone(), violations.handler(), config)
            .with_count_observer(move |count| {
                sink.lock().unwrap_or_else(PoisonError::into_inner).push(count);
            });

        Self {
            dispatcher,
            transport,
            violations,
            over_limit,
            policy,
            rng: ChaCha8Rng::seed_from_u64(seed),
            turn_size,
        }
    }

    /// Run turns of `turn_size` events instead of the fragment limit.
    ///
    /// Turns longer than the limit trip the rate probe.
    #[must_use]
    pub fn with_turn_size(mut self, turn_size: usize) -> Self {
        self.turn_size = turn_size.max(1);
        self
    }

    /// Install the live owner registry.
    pub fn set_owner_registry(&mut self, owners: Arc<dyn OwnerRegistry>) {
        self.dispatcher.set_owner_registry(owners);
    }

    /// The dispatcher under test.
    pub fn dispatcher(&self) -> &ReplayDispatcher<SimTransport> {
        &self.dispatcher
    }

    /// The simulated downstream transport.
    pub fn transport(&self) -> &SimTransport {
        &self.transport
    }

    /// Play `events` in order and drain outstanding completions.
    pub fn run(&mut self, events: &[ReplayEvent]) -> ReplayReport {
        let mut report = ReplayReport::default();

        for turn in events.chunks(self.turn_size) {
            self.dispatcher.reset_counter();

            for event in turn {
                if event.opens_operation() {
                    self.settle();
                }

                let outcome = self.dispatcher.dispatch(event);
                report.record(outcome);
                self.after_dispatch(event, outcome, &mut report);
            }

            self.dispatcher.check_configured_limit();
            report.turns += 1;
        }

        let drained = self.transport.complete_all();
        tracing::debug!(target: "reproduction", drained, "Replay drained");

        report.final_time = self.dispatcher.now();
        report.violations = self.violations.take();
        report.over_limit =
            std::mem::take(&mut *self.over_limit.lock().unwrap_or_else(PoisonError::into_inner));
        report
    }

    fn after_dispatch(
        &mut self,
        event: &ReplayEvent,
        outcome: DispatchOutcome,
        report: &mut ReplayReport,
    ) {
        match event {
            ReplayEvent::Connect(_) => {
                if let Ok(connection_id) = self.dispatcher.take_new_connection_id() {
                    report.connections.push(connection_id);
                }
            },
            ReplayEvent::Message(_) => {
                if outcome == DispatchOutcome::Forwarded
                    && self.policy == CompletionPolicy::Immediate
                {
                    self.transport.complete_next();
                }
            },
            ReplayEvent::Heartbeat(_) => {
                if self.policy != CompletionPolicy::Immediate && self.rng.gen_bool(0.5) {
                    self.transport.complete_all();
                }
            },
        }
    }

    /// Flush held completions before an operation opens.
    fn settle(&mut self) {
        if let CompletionPolicy::Lagging { skip_percent } = self.policy
            && self.rng.gen_range(0u8..100) < skip_percent
        {
            tracing::debug!(
                target: "reproduction",
                awaiting = self.transport.awaiting_completion(),
                "Consumer lagging; completion flush skipped"
            );
            return;
        }

        self.transport.complete_all();
    }
}
