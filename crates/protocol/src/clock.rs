//! Lamport logical clock

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe Lamport clock.
///
/// Every operation runs inside one critical section, so increments from the
/// activity loop and merges from connection handlers never interleave. The
/// value never decreases.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: Mutex<u64>,
}

impl LogicalClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local event (internal step or send); returns the new value
    pub fn increment(&self) -> u64 {
        let mut value = self.lock();
        *value = value.saturating_add(1);
        *value
    }

    /// Merge a received timestamp: `max(local, received) + 1`.
    ///
    /// Saturates at `u64::MAX` rather than wrapping; callers reject inbound
    /// timestamps that cannot be advanced (see [`crate::Message::decode`]).
    pub fn update(&self, received: u64) -> u64 {
        let mut value = self.lock();
        *value = (*value).max(received).saturating_add(1);
        *value
    }

    /// Read the current value without advancing it
    pub fn peek(&self) -> u64 {
        *self.lock()
    }

    // The guarded value is a plain integer, so a panic elsewhere cannot leave
    // it half-written.
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
