//! Retry policy for contended compare-and-swap updates.

use std::time::Duration;

/// What `apply_op` does after losing a compare-and-swap race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Re-read and retry immediately until the update lands.
    #[default]
    Unbounded,

    /// Retry with exponential backoff, giving up after `max_attempts`
    /// compare-and-swap attempts.
    Bounded {
        /// Maximum number of compare-and-swap attempts
        max_attempts: u32,
        /// Backoff before the first retry in milliseconds
        initial_backoff_ms: u64,
        /// Upper bound on a single backoff in milliseconds
        max_backoff_ms: u64,
    },
}

impl RetryPolicy {
    /// Delay before the next attempt, after `attempts` attempts have lost
    /// the race. `None` means give up.
    ///
    /// `jitter` is a random draw; the delay lands in `[backoff/2, backoff]`.
    pub fn next_delay(&self, attempts: u32, jitter: u64) -> Option<Duration> {
        match *self {
            Self::Unbounded => Some(Duration::ZERO),
            Self::Bounded { max_attempts, initial_backoff_ms, max_backoff_ms } => {
                if attempts >= max_attempts {
                    return None;
                }

                let exponent = attempts.saturating_sub(1).min(32);
                let backoff = initial_backoff_ms.saturating_mul(1u64 << exponent).min(max_backoff_ms);
                let half = backoff / 2;
                Some(Duration::from_millis(half + jitter % (backoff - half + 1)))
            },
        }
    }
}
