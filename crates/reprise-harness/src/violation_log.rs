//! Collecting error handler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reprise_core::{ErrorHandler, ErrorKind, ReplayError};

/// Error handler that keeps every reported error for later inspection.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ViolationLog {
    errors: Arc<Mutex<Vec<ReplayError>>>,
}

impl ViolationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn errors(&self) -> MutexGuard<'_, Vec<ReplayError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handler to pass to the dispatcher.
    pub fn handler(&self) -> Arc<dyn ErrorHandler> {
        Arc::new(self.clone())
    }

    /// Copy of everything reported so far.
    pub fn snapshot(&self) -> Vec<ReplayError> {
        self.errors().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<ReplayError> {
        std::mem::take(&mut *self.errors())
    }

    /// Number of reported errors.
    pub fn len(&self) -> usize {
        self.errors().len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.errors().is_empty()
    }

    /// Number of reported errors of `kind`.
    pub fn count_kind(&self, kind: ErrorKind) -> usize {
        self.count(|e| e.kind() == kind)
    }

    /// Number of reported errors matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ReplayError) -> bool) -> usize {
        self.errors().iter().filter(|e| predicate(e)).count()
    }
}

impl ErrorHandler for ViolationLog {
    fn on_error(&self, error: &ReplayError) {
        tracing::warn!(target: "reproduction", %error, kind = ?error.kind(), "Violation recorded");
        self.errors().push(error.clone());
    }
}
