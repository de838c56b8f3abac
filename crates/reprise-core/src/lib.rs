//! Deterministic replay core for recorded session-protocol traffic.
//!
//! Re-drives a captured stream of connect, message and heartbeat events
//! through the production message-handling path so a historical run can be
//! reproduced exactly. The core is Sans-IO: it never touches the network,
//! only a [`ReplayTransport`] supplied by the caller.
//!
//! # Components
//!
//! - [`ReplayClock`]: logical time derived from recorded timestamps, never
//!   moves backwards
//! - [`OperationSequencer`]: asserts that at most one forwarded operation is
//!   outstanding
//! - [`OwnerRegistry`]: read-only view of live owners for provenance checks
//! - [`ReplayDispatcher`]: routes each [`ReplayEvent`] through clock,
//!   validation, sequencer and transport
//!
//! # Errors
//!
//! Replay is audit-first. Contract breaches go to an [`ErrorHandler`] and
//! processing continues, so one pass surfaces every anomaly in the capture.
//! Only driver misuse ([`ReplayError::UnknownConnectionId`]) is returned as
//! an `Err`.
//!
//! # Logging
//!
//! Everything is emitted on the `reproduction` tracing target. Enable it with
//! `RUST_LOG=reproduction=debug` (or `trace` for every clock move).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod registry;
pub mod sequencer;
pub mod transport;

pub use clock::{EpochClock, EpochNanoClock, LogicalTime, MillisClock, ReplayClock};
pub use config::ReplayConfig;
pub use dispatcher::{CountObserver, DispatchOutcome, ReplayDispatcher};
pub use error::{ErrorHandler, ErrorKind, LoggingErrorHandler, ReplayError};
pub use event::{
    ConnectEvent, ConnectionId, ENGINE_OWNER_ID, EventKind, FramedRange, HeartbeatEvent,
    MESSAGE_HEADER_LENGTH, MessageEvent, OwnerId, RESEND_REQUEST_MESSAGE_TYPE, ReplayEvent,
};
pub use registry::{LiveOwnerInfo, OwnerRegistry, OwnerTable};
pub use sequencer::OperationSequencer;
pub use transport::{CompletionHandle, EnqueuedMessage, ReplayTransport};
