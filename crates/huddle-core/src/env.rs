//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (monotonic time, wall clock,
//! randomness). Production uses real system resources; tests and simulations
//! use [`ManualEnv`], whose clock only moves when told to.

use std::{
    fmt,
    future::Future,
    ops::{Add, Sub},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};

/// Abstract environment providing time, randomness, and async sleeping.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production environments use `tokio::time::Instant` (so paused test
    /// time works), simulations use [`VirtualInstant`].
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + fmt::Debug
        + Add<Duration, Output = Self::Instant>
        + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time. Only used for advisory client timestamps and
    /// locally generated notices, never for ordering.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not session logic).
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Instant on a [`ManualEnv`] clock: time elapsed since the clock was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    /// Time since the clock origin.
    pub fn elapsed_since_origin(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub for VirtualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Manually driven environment.
///
/// The clock starts at zero and only advances through [`ManualEnv::advance`]
/// or [`Environment::sleep`]. Randomness is a seeded splitmix64 stream. Clones
/// share the same clock.
#[derive(Clone)]
pub struct ManualEnv {
    inner: Arc<ManualClock>,
}

struct ManualClock {
    elapsed_ms: AtomicU64,
    wall_origin: DateTime<Utc>,
    rng_state: AtomicU64,
}

impl ManualEnv {
    /// Create an environment whose wall clock starts at `wall_origin`.
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self::with_seed(wall_origin, 0x5EED)
    }

    /// Create an environment with an explicit RNG seed.
    pub fn with_seed(wall_origin: DateTime<Utc>, seed: u64) -> Self {
        Self {
            inner: Arc::new(ManualClock {
                elapsed_ms: AtomicU64::new(0),
                wall_origin,
                rng_state: AtomicU64::new(seed),
            }),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.inner.elapsed_ms.fetch_add(millis, Ordering::SeqCst);
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.inner.elapsed_ms.load(Ordering::SeqCst))
    }
}

impl fmt::Debug for ManualEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Environment for ManualEnv {
    type Instant = VirtualInstant;

    fn now(&self) -> VirtualInstant {
        VirtualInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.inner.wall_origin + TimeDelta::milliseconds(millis)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let state = self
                .inner
                .rng_state
                .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst)
                .wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            let bytes = z.to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = ManualEnv::new(origin());
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(1500));
        assert_eq!(env.now() - t0, Duration::from_millis(1500));
        assert_eq!(env.wall_clock(), origin() + TimeDelta::milliseconds(1500));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = ManualEnv::new(origin());
        let other = env.clone();
        other.advance(Duration::from_secs(3));
        assert_eq!(env.now().elapsed_since_origin(), Duration::from_secs(3));
    }

    #[test]
    fn same_seed_same_randomness() {
        let a = ManualEnv::with_seed(origin(), 7);
        let b = ManualEnv::with_seed(origin(), 7);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), a.random_u64());
    }

    #[test]
    fn virtual_instant_subtraction_saturates() {
        let early = VirtualInstant::default();
        let late = early + Duration::from_secs(1);
        assert_eq!(early - late, Duration::ZERO);
    }
}
