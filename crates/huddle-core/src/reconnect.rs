//! Reconnect backoff.
//!
//! Delay for attempt `n` (zero-based) is `min(base * 2^n, max)`. The policy is
//! pure arithmetic; scheduling lives in the connection manager.

use std::time::Duration;

/// Delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Consecutive failed connections tolerated before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff with a hard attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay for attempt 0
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Attempt ceiling
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (zero-based).
    ///
    /// Never exceeds `max_delay`; large attempts saturate instead of
    /// overflowing.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Effective attempt ceiling. A ceiling of 0 behaves as 1: the first
    /// drop fails the session.
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        should_retry(attempt, self.ceiling())
    }
}

/// Whether another attempt is allowed after `attempt` failures.
#[must_use]
pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
    attempt < max_attempts
}
