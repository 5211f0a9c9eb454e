//! Production Environment implementation using tokio time and the OS RNG.
//!
//! `SystemEnv` uses `tokio::time::Instant`, so a runtime started with paused
//! time (`#[tokio::test(start_paused = true)]`) drives the session
//! deterministically without a separate virtual clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_core::Environment;

/// Clock, timers and randomness backed by the running tokio runtime.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Environment bound to the ambient tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("OS RNG unavailable");
    }
}
