//! Logical clock driven by replayed event timestamps.
//!
//! During a replay no wall clock is consulted. Every dispatched event carries
//! the nanosecond timestamp it was recorded with, and the clock moves forward
//! to it. Session logic downstream reads the same clock for timeout and
//! staleness decisions, so the clock must never go backwards.
//!
//! Recorded heartbeats use timestamps cached at send time, which can be
//! earlier than a message processed just before them. The clock therefore
//! keeps the maximum of every timestamp it has seen rather than the latest.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Nanoseconds since an arbitrary epoch.
pub type LogicalTime = u64;

/// Nanoseconds in one millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// A clock that reports time in epoch nanoseconds.
///
/// # Invariants
///
/// - `nano_time()` never decreases within a single replay run.
pub trait EpochNanoClock: Send + Sync {
    /// Current time in nanoseconds.
    fn nano_time(&self) -> LogicalTime;
}

/// A clock that reports time in epoch milliseconds.
pub trait EpochClock: Send + Sync {
    /// Current time in milliseconds.
    fn time(&self) -> u64;
}

/// Monotonic virtual clock advanced by replayed events.
///
/// Cloning yields another handle onto the same time cell, so the dispatcher
/// and any consumer holding a clone always observe the same value.
#[derive(Debug, Clone, Default)]
pub struct ReplayClock {
    time_ns: Arc<AtomicU64>,
}

impl ReplayClock {
    /// Create a clock starting at `initial` nanoseconds.
    pub fn new(initial: LogicalTime) -> Self {
        Self { time_ns: Arc::new(AtomicU64::new(initial)) }
    }

    /// Current logical time.
    pub fn current(&self) -> LogicalTime {
        self.time_ns.load(Ordering::Acquire)
    }

    /// Move the clock forward to `candidate` if it is ahead.
    ///
    /// A candidate behind the clock is tolerated and ignored. Returns the
    /// value the clock held before the call.
    pub fn advance_to(&self, candidate: LogicalTime) -> LogicalTime {
        let old = self.time_ns.fetch_max(candidate, Ordering::AcqRel);

        tracing::trace!(
            target: "reproduction",
            old,
            new = candidate,
            back = old > candidate,
            "Clock.advance"
        );

        debug_assert!(self.current() >= old);
        old
    }

    /// Millisecond view over the same time cell.
    pub fn to_millis(&self) -> MillisClock {
        MillisClock { inner: self.clone() }
    }
}

impl EpochNanoClock for ReplayClock {
    fn nano_time(&self) -> LogicalTime {
        self.current()
    }
}

/// Read-only millisecond projection of a [`ReplayClock`].
#[derive(Debug, Clone)]
pub struct MillisClock {
    inner: ReplayClock,
}

impl EpochClock for MillisClock {
    fn time(&self) -> u64 {
        self.inner.current() / NANOS_PER_MILLI
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_time() {
        let clock = ReplayClock::new(42);
        assert_eq!(clock.current(), 42);
        assert_eq!(clock.nano_time(), 42);
    }

    #[test]
    fn advance_keeps_maximum() {
        let clock = ReplayClock::new(0);

        assert_eq!(clock.advance_to(100), 0);
        assert_eq!(clock.current(), 100);

        // Cached heartbeat timestamp behind the clock
        assert_eq!(clock.advance_to(90), 100);
        assert_eq!(clock.current(), 100);

        assert_eq!(clock.advance_to(150), 100);
        assert_eq!(clock.current(), 150);
    }

    #[test]
    fn clones_share_time() {
        let clock = ReplayClock::new(5);
        let reader = clock.clone();

        clock.advance_to(77);
        assert_eq!(reader.current(), 77);
    }

    #[test]
    fn millis_view_reads_through() {
        let clock = ReplayClock::new(0);
        let millis = clock.to_millis();
        assert_eq!(millis.time(), 0);

        clock.advance_to(3 * NANOS_PER_MILLI + 999_999);
        assert_eq!(millis.time(), 3);

        clock.advance_to(4 * NANOS_PER_MILLI);
        assert_eq!(millis.time(), 4);
    }
}
