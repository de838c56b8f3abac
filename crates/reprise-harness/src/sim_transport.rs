//! In-memory downstream transport.
//!
//! Records everything the dispatcher forwards and lets the test decide when
//! accepted messages are completed. Clones share state, so the driver keeps
//! one clone while the dispatcher owns another.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use reprise_core::{CompletionHandle, ConnectEvent, ConnectionId, EnqueuedMessage, ReplayTransport};

#[derive(Debug, Default)]
struct SimState {
    /// Every accepted message, in order
    messages: Vec<EnqueuedMessage>,
    /// Every forwarded connect, in order
    connects: Vec<ConnectEvent>,
    /// Accepted messages not yet completed
    awaiting_completion: VecDeque<ConnectionId>,
    /// Messages still to refuse
    reject_remaining: usize,
    /// Messages refused so far
    rejected: usize,
    /// Registered by the dispatcher at construction
    completion: Option<CompletionHandle>,
}

/// Recording transport with test-controlled completion.
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// Create an empty transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `count` messages.
    pub fn reject_next(&self, count: usize) {
        self.state().reject_remaining = count;
    }

    /// Complete the oldest accepted message.
    ///
    /// Returns its connection id, or `None` if nothing is awaiting
    /// completion.
    pub fn complete_next(&self) -> Option<ConnectionId> {
        let (connection_id, handle) = {
            let mut state = self.state();
            let connection_id = state.awaiting_completion.pop_front()?;
            (connection_id, state.completion.clone()?)
        };

        handle.complete();
        Some(connection_id)
    }

    /// Complete every accepted message. Returns how many were completed.
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next().is_some() {
            completed += 1;
        }
        completed
    }

    /// Signal completion without any accepted message behind it.
    ///
    /// Models a consumer that double-completes.
    pub fn complete_spurious(&self) {
        let handle = self.state().completion.clone();
        if let Some(handle) = handle {
            handle.complete();
        }
    }

    /// Accepted messages not yet completed.
    pub fn awaiting_completion(&self) -> usize {
        self.state().awaiting_completion.len()
    }

    /// Accepted messages, in order.
    pub fn messages(&self) -> Vec<EnqueuedMessage> {
        self.state().messages.clone()
    }

    /// Forwarded connects, in order.
    pub fn connects(&self) -> Vec<ConnectEvent> {
        self.state().connects.clone()
    }

    /// Messages refused so far.
    pub fn rejected(&self) -> usize {
        self.state().rejected
    }

    /// Returns true once the dispatcher has registered its handle.
    pub fn is_registered(&self) -> bool {
        self.state().completion.is_some()
    }
}

impl ReplayTransport for SimTransport {
    fn enqueue_message(&mut self, message: EnqueuedMessage) -> bool {
        let mut state = self.state();

        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            state.rejected += 1;
            tracing::debug!(
                target: "reproduction",
                connection_id = message.connection_id(),
                "SimTransport refusing message"
            );
            return false;
        }

        state.awaiting_completion.push_back(message.connection_id());
        state.messages.push(message);
        true
    }

    fn enqueue_connect(&mut self, connect: &ConnectEvent) {
        self.state().connects.push(connect.clone());
    }

    fn register_completion(&mut self, handle: CompletionHandle) {
        self.state().completion = Some(handle);
    }
}
