//! Replay event dispatcher.
//!
//! Receives decoded events from the log reader and re-drives them through
//! the downstream transport in recorded order. For every event:
//!
//! 1. Count it for the rate probe
//! 2. Advance the logical clock to its timestamp
//! 3. Check its owner against the registry (messages and heartbeats)
//! 4. Open an operation (messages and connects)
//! 5. Forward it downstream (messages and connects)
//!
//! Operations close asynchronously: messages through the transport's
//! [`CompletionHandle`], connects when the resulting connection id is taken
//! with [`ReplayDispatcher::take_new_connection_id`]. Contract breaches are
//! reported to the [`ErrorHandler`] and replay continues.

use std::sync::Arc;

use crate::{
    clock::{LogicalTime, ReplayClock},
    config::ReplayConfig,
    error::{ErrorHandler, ReplayError},
    event::{
        ConnectEvent, ConnectionId, ENGINE_OWNER_ID, HeartbeatEvent, MessageEvent, OwnerId,
        ReplayEvent,
    },
    registry::OwnerRegistry,
    sequencer::OperationSequencer,
    transport::{CompletionHandle, EnqueuedMessage, ReplayTransport},
};

/// Callback invoked with the dispatch count when the rate probe limit is
/// exceeded.
pub type CountObserver = Arc<dyn Fn(u32) + Send + Sync>;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the downstream transport
    Forwarded,
    /// Downstream transport refused the message
    Rejected,
    /// Recorded offsets were unusable; nothing was forwarded
    Dropped,
    /// Clock advanced and owner checked; nothing to forward
    Observed,
}

/// Re-drives recorded events through a downstream transport.
pub struct ReplayDispatcher<T: ReplayTransport> {
    /// Downstream transport
    transport: T,
    /// Logical clock advanced by every event
    clock: ReplayClock,
    /// Single-operation assertion
    sequencer: Arc<OperationSequencer>,
    /// Error channel
    errors: Arc<dyn ErrorHandler>,
    /// Live owners, installed once upstream registration completes
    owners: Option<Arc<dyn OwnerRegistry>>,
    /// Connection id of the last connect, until taken
    pending_connection_id: Option<ConnectionId>,
    /// Events dispatched since the last reset
    dispatch_count: u32,
    /// Rate probe observer
    count_observer: Option<CountObserver>,
    /// Replay configuration
    config: ReplayConfig,
}

impl<T: ReplayTransport> ReplayDispatcher<T> {
    /// Create a dispatcher with a fresh clock starting at
    /// `config.initial_time_ns`.
    ///
    /// Registers the completion handle with `transport`.
    pub fn new(transport: T, errors: Arc<dyn ErrorHandler>, config: ReplayConfig) -> Self {
        let clock = ReplayClock::new(config.initial_time_ns);
        Self::with_clock(transport, clock, errors, config)
    }

    /// Create a dispatcher that advances an existing clock.
    ///
    /// Use this when session logic already holds a clone of the clock.
    pub fn with_clock(
        mut transport: T,
        clock: ReplayClock,
        errors: Arc<dyn ErrorHandler>,
        config: ReplayConfig,
    ) -> Self {
        let sequencer = Arc::new(OperationSequencer::new(Arc::clone(&errors)));
        transport.register_completion(CompletionHandle::new(Arc::clone(&sequencer)));

        Self {
            transport,
            clock,
            sequencer,
            errors,
            owners: None,
            pending_connection_id: None,
            dispatch_count: 0,
            count_observer: None,
            config,
        }
    }

    /// Install the rate probe observer.
    #[must_use]
    pub fn with_count_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.count_observer = Some(Arc::new(observer));
        self
    }

    /// Replace (or clear) the rate probe observer.
    pub fn set_count_observer(&mut self, observer: Option<CountObserver>) {
        self.count_observer = observer;
    }

    /// Install the live owner registry.
    ///
    /// Until this is called, any event attributed to an owner other than
    /// [`ENGINE_OWNER_ID`] is reported as [`ReplayError::OwnerRegistryMissing`].
    pub fn set_owner_registry(&mut self, owners: Arc<dyn OwnerRegistry>) {
        tracing::debug!(
            target: "reproduction",
            owners = ?owners.owner_ids(),
            "Owner registry installed"
        );
        self.owners = Some(owners);
    }

    /// Dispatch any decoded event.
    pub fn dispatch(&mut self, event: &ReplayEvent) -> DispatchOutcome {
        match event {
            ReplayEvent::Message(message) => self.on_message(message),
            ReplayEvent::Connect(connect) => self.on_connect(connect),
            ReplayEvent::Heartbeat(heartbeat) => self.on_heartbeat(heartbeat),
        }
    }

    /// Replay a recorded message.
    ///
    /// Forwards the window from the start of the message's fixed header
    /// through the end of its decoded content. A rejected or dropped message
    /// leaves its operation open.
    pub fn on_message(&mut self, event: &MessageEvent) -> DispatchOutcome {
        self.dispatch_count = self.dispatch_count.saturating_add(1);

        tracing::debug!(
            target: "reproduction",
            connection_id = event.connection_id,
            owner_id = event.owner_id,
            timestamp = event.timestamp,
            message_type = event.message_type,
            offset = event.offset,
            length = event.length,
            "onMessage"
        );

        self.clock.advance_to(event.timestamp);
        self.validate_owner(event.owner_id);
        self.sequencer.start();

        let range = match event.framed_range() {
            Ok(range) => range,
            Err(e) => {
                self.errors.on_error(&e);
                return DispatchOutcome::Dropped;
            },
        };

        let message = EnqueuedMessage::new(
            event.connection_id,
            event.buffer.clone(),
            range,
            event.is_resend_request(),
        );

        if self.transport.enqueue_message(message) {
            DispatchOutcome::Forwarded
        } else {
            // Reported at error level by the error channel
            tracing::debug!(
                target: "reproduction",
                connection_id = event.connection_id,
                header_start = range.header_start,
                full_length = range.full_length,
                "Downstream transport rejected replayed message"
            );
            self.errors.on_error(&ReplayError::EnqueueRejected {
                connection_id: event.connection_id,
            });
            DispatchOutcome::Rejected
        }
    }

    /// Replay a recorded connection establishment.
    ///
    /// The operation stays open until [`Self::take_new_connection_id`].
    pub fn on_connect(&mut self, event: &ConnectEvent) -> DispatchOutcome {
        self.dispatch_count = self.dispatch_count.saturating_add(1);

        tracing::debug!(
            target: "reproduction",
            connection_id = event.connection_id,
            owner_id = event.owner_id,
            timestamp = event.timestamp,
            address = %event.address,
            "onConnect"
        );

        self.clock.advance_to(event.timestamp);
        self.sequencer.start();

        if let Some(unread) = self.pending_connection_id.replace(event.connection_id) {
            tracing::warn!(
                target: "reproduction",
                unread,
                connection_id = event.connection_id,
                "Overwriting connection id that was never taken"
            );
        }

        self.transport.enqueue_connect(event);
        DispatchOutcome::Forwarded
    }

    /// Replay a recorded heartbeat.
    ///
    /// Only moves the clock and checks the owner.
    pub fn on_heartbeat(&mut self, event: &HeartbeatEvent) -> DispatchOutcome {
        self.dispatch_count = self.dispatch_count.saturating_add(1);

        tracing::debug!(
            target: "reproduction",
            owner_id = event.owner_id,
            timestamp = event.timestamp,
            "onApplicationHeartbeat"
        );

        self.clock.advance_to(event.timestamp);
        self.validate_owner(event.owner_id);
        DispatchOutcome::Observed
    }

    /// Take the connection id recorded by the last connect event.
    ///
    /// Closes the operation that connect opened.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::UnknownConnectionId`] if no connect is pending.
    /// This is a driver bug; the error is also reported to the error channel.
    pub fn take_new_connection_id(&mut self) -> Result<ConnectionId, ReplayError> {
        let Some(connection_id) = self.pending_connection_id.take() else {
            let err = ReplayError::UnknownConnectionId;
            self.errors.on_error(&err);
            return Err(err);
        };

        self.sequencer.end();
        Ok(connection_id)
    }

    /// Zero the dispatch counter.
    pub fn reset_counter(&mut self) {
        self.dispatch_count = 0;
    }

    /// Report if more than `limit` events were dispatched since the last
    /// reset.
    ///
    /// Invokes the count observer, if any, with the current count. Never
    /// throttles. Returns true if the limit was exceeded.
    pub fn check_counter(&self, limit: u32) -> bool {
        if self.dispatch_count <= limit {
            return false;
        }

        tracing::debug!(
            target: "reproduction",
            count = self.dispatch_count,
            limit,
            "Dispatch count exceeded fragment limit"
        );

        if let Some(observer) = &self.count_observer {
            observer(self.dispatch_count);
        }
        true
    }

    /// [`Self::check_counter`] against the configured fragment limit.
    pub fn check_configured_limit(&self) -> bool {
        self.check_counter(self.config.fragment_limit)
    }

    /// Events dispatched since the last reset.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count
    }

    /// Returns true while an operation is outstanding.
    pub fn operation_in_progress(&self) -> bool {
        self.sequencer.is_in_progress()
    }

    /// Connection id recorded by the last connect, if not yet taken.
    pub fn pending_connection_id(&self) -> Option<ConnectionId> {
        self.pending_connection_id
    }

    /// The logical clock. Clone it to share with session logic.
    pub fn clock(&self) -> &ReplayClock {
        &self.clock
    }

    /// Current logical time.
    pub fn now(&self) -> LogicalTime {
        self.clock.current()
    }

    /// Replay configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Downstream transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable downstream transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn validate_owner(&self, owner_id: OwnerId) {
        if owner_id == ENGINE_OWNER_ID {
            return;
        }

        match &self.owners {
            Some(owners) if owners.contains(owner_id) => {},
            Some(owners) => {
                self.errors
                    .on_error(&ReplayError::UnknownOwner { owner_id, known: owners.owner_ids() });
            },
            None => self.errors.on_error(&ReplayError::OwnerRegistryMissing { owner_id }),
        }
    }
}
