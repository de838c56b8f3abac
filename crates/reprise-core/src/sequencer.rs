//! Single-operation assertion for replayed work.
//!
//! The replay driver withholds the next event until the downstream transport
//! has finished with the previous one. The sequencer does not enforce that
//! contract; it only notices when it was broken. `start` with an operation
//! outstanding and `end` with none outstanding are both reported through the
//! error channel, and the flag is updated regardless.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::{ErrorHandler, ReplayError};

/// Tracks whether an operation is outstanding.
pub struct OperationSequencer {
    in_progress: AtomicBool,
    errors: Arc<dyn ErrorHandler>,
}

impl OperationSequencer {
    /// Create an idle sequencer reporting to `errors`.
    pub fn new(errors: Arc<dyn ErrorHandler>) -> Self {
        Self { in_progress: AtomicBool::new(false), errors }
    }

    /// Mark an operation as started.
    ///
    /// Reports [`ReplayError::MultipleOperationsInFlight`] if one was already
    /// outstanding, then proceeds anyway.
    pub fn start(&self) {
        let was_in_progress = self.in_progress.swap(true, Ordering::AcqRel);

        tracing::debug!(target: "reproduction", was_in_progress, "startOperation");

        if was_in_progress {
            self.errors.on_error(&ReplayError::MultipleOperationsInFlight);
        }
    }

    /// Mark the outstanding operation as complete.
    ///
    /// Reports [`ReplayError::NoOperationInFlight`] if none was outstanding.
    pub fn end(&self) {
        let was_in_progress = self.in_progress.swap(false, Ordering::AcqRel);

        tracing::debug!(target: "reproduction", was_in_progress, "endOperation");

        if !was_in_progress {
            self.errors.on_error(&ReplayError::NoOperationInFlight);
        }
    }

    /// Returns true while an operation is outstanding.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for OperationSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSequencer").field("in_progress", &self.is_in_progress()).finish()
    }
}
