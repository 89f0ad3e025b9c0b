//! Bounded admission control for pair queries.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counting gate that admits at most `capacity` concurrent holders.
///
/// There is no queue: a caller either gets a permit within its timeout or
/// is turned away.
#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    in_flight: Mutex<usize>,
    released: Condvar,
}

impl ConcurrencyGate {
    /// Create a gate admitting `capacity` holders (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take a permit, waiting at most `timeout`.
    ///
    /// A zero timeout never blocks. The permit is returned when dropped.
    pub fn acquire(&self, timeout: Duration) -> Option<GatePermit<'_>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut in_flight = self.lock();

        while *in_flight >= self.capacity {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return None;
            }
            in_flight = self
                .released
                .wait_timeout(in_flight, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        *in_flight += 1;
        Some(GatePermit { gate: self })
    }

    /// Maximum number of concurrent holders.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.lock()
    }

    fn release(&self) {
        let mut in_flight = self.lock();
        *in_flight = in_flight.saturating_sub(1);
        drop(in_flight);
        self.released.notify_one();
    }
}

/// A held slot of a [`ConcurrencyGate`].
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
