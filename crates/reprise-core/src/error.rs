//! Error types and the error channel for replay auditing.
//!
//! Replay is audit-first: most problems are reported through an
//! [`ErrorHandler`] and processing continues, so a single pass surfaces every
//! historical anomaly. Only usage errors are also returned to the caller.

use thiserror::Error;

use crate::event::{ConnectionId, OwnerId};

/// Errors observed while replaying an event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// An operation was started while another was still outstanding.
    #[error("multiple operations in flight attempted")]
    MultipleOperationsInFlight,

    /// An operation was completed but none was outstanding.
    #[error("no operation in flight")]
    NoOperationInFlight,

    /// Event attributed to an owner that is not registered.
    #[error("unknown owner id: {owner_id} not in {known:?}")]
    UnknownOwner {
        /// Owner the event claimed
        owner_id: OwnerId,
        /// Owners registered at dispatch time, ascending
        known: Vec<OwnerId>,
    },

    /// Owner validation was needed before any registry was installed.
    #[error("owner registry not installed: cannot validate owner id {owner_id}")]
    OwnerRegistryMissing {
        /// Owner the event claimed
        owner_id: OwnerId,
    },

    /// A new connection id was requested with no connect event pending.
    #[error("unknown connection id: no connect event pending")]
    UnknownConnectionId,

    /// The downstream transport refused a forwarded message.
    #[error("downstream transport rejected message for connection {connection_id}")]
    EnqueueRejected {
        /// Connection the message belonged to
        connection_id: ConnectionId,
    },

    /// Recorded offsets do not describe a framed message inside the buffer.
    #[error("malformed frame for connection {connection_id}: {reason}")]
    MalformedFrame {
        /// Connection the message belonged to
        connection_id: ConnectionId,
        /// What was wrong with the offsets
        reason: String,
    },
}

/// Classification of a [`ReplayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The external single-operation or provenance contract was broken.
    /// Reported, replay continues.
    InvariantViolation,
    /// The driver misused the dispatcher API. Reported and returned.
    UsageError,
    /// The downstream transport refused work. Reported, no retry.
    DownstreamRejection,
}

impl ReplayError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MultipleOperationsInFlight
            | Self::NoOperationInFlight
            | Self::UnknownOwner { .. }
            | Self::OwnerRegistryMissing { .. }
            | Self::MalformedFrame { .. } => ErrorKind::InvariantViolation,
            Self::UnknownConnectionId => ErrorKind::UsageError,
            Self::EnqueueRejected { .. } => ErrorKind::DownstreamRejection,
        }
    }

    /// Returns true if the caller must stop: the error indicates a
    /// programming error in the driver rather than a data anomaly.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::UsageError
    }
}

/// Channel that receives every error observed during replay.
///
/// Implementations must not panic; the dispatcher keeps going after
/// reporting.
pub trait ErrorHandler: Send + Sync {
    /// Called once per observed error.
    fn on_error(&self, error: &ReplayError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ReplayError) + Send + Sync,
{
    fn on_error(&self, error: &ReplayError) {
        self(error);
    }
}

/// Error handler that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, error: &ReplayError) {
        tracing::error!(target: "reproduction", kind = ?error.kind(), "{error}");
    }
}
