//! Per-room monotonic logical clock.
//!
//! Timestamps are wall-clock milliseconds pushed forward whenever the
//! wall clock stalls or steps back: `stamp() = max(now_ms, last + 1)`.
//! Each room owns one clock, mutated only from the room's serial
//! executor, so stamping needs no synchronization.

use chrono::Utc;

use crate::change::Timestamp;

/// Strictly monotonic millisecond clock for one room.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: Timestamp,
}

impl LogicalClock {
    /// A clock that has issued nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from the highest timestamp already applied to the room,
    /// so a reloaded room never re-issues an old stamp.
    #[must_use]
    pub fn resume_from(last: Timestamp) -> Self {
        Self { last }
    }

    /// Issue the next timestamp. Strictly greater than every previous
    /// stamp from this clock.
    pub fn stamp(&mut self) -> Timestamp {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last
    }

    /// The most recently issued (or resumed) timestamp.
    #[must_use]
    pub const fn last(&self) -> Timestamp {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_are_strictly_increasing() {
        let mut clock = LogicalClock::new();
        let mut prev = clock.stamp();
        for _ in 0..10_000 {
            let next = clock.stamp();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn resume_never_reissues_old_stamps() {
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        let mut clock = LogicalClock::resume_from(far_future);
        assert_eq!(clock.stamp(), far_future + 1);
    }

    #[test]
    fn tracks_wall_clock_when_ahead() {
        let mut clock = LogicalClock::resume_from(0);
        let now = Utc::now().timestamp_millis();
        assert!(clock.stamp() >= now);
    }
}
