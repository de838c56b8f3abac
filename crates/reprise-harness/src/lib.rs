//! Deterministic test harness for the Reprise replay core.
//!
//! Provides an in-memory [`ReplayTransport`](reprise_core::ReplayTransport)
//! with test-controlled completion, a collecting error handler, script
//! builders that lay messages out like the recorded log, and a seeded driver
//! that plays scripts in the engine's scheduling turns.
//!
//! # Determinism
//!
//! The only randomness is the driver's `ChaCha8Rng`. Re-running a failing
//! case with the same seed and script reproduces it exactly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod script;
pub mod sim_transport;
pub mod violation_log;

pub use driver::{CompletionPolicy, ReplayDriver, ReplayReport};
pub use script::{FIXED_BLOCK_LENGTH, ScriptBuilder, ScriptOp};
pub use sim_transport::SimTransport;
pub use violation_log::ViolationLog;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test-friendly tracing subscriber.
///
/// Honours `RUST_LOG`, defaulting to `reproduction=info`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reproduction=info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init();
}
