//! Exponential back-off with a bounded jitter band, used by the sync
//! retry path: `delay = min(cap, initial * 2^attempt) ± jitter%`.

use std::time::Duration;

/// Exponential back-off calculator with symmetric percentage jitter.
#[derive(Debug)]
pub(crate) struct Backoff {
    /// First delay in milliseconds.
    initial_ms: u64,
    /// Delay cap in milliseconds.
    max_ms: u64,
    /// Jitter band around each delay, in percent (±).
    jitter_pct: u8,
    /// Current attempt number (0-indexed).
    attempt: u32,
}

impl Backoff {
    /// Create a new back-off calculator.
    pub(crate) fn new(initial_ms: u64, max_ms: u64, jitter_pct: u8) -> Self {
        Self {
            initial_ms,
            max_ms,
            jitter_pct,
            attempt: 0,
        }
    }

    /// Compute the next delay and advance the attempt.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let exp = self
            .initial_ms
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_ms);
        let band = capped.saturating_mul(u64::from(self.jitter_pct)) / 100;
        let jittered = if band == 0 {
            capped
        } else {
            let low = capped.saturating_sub(band);
            fastrand::u64(low..=capped.saturating_add(band))
        };
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(jittered)
    }

    /// Reset the attempt counter after a successful write.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts made since the last reset.
    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }
}
