//! Reconnect Backoff
//!
//! Decides how long the telemetry link waits before its next connection attempt.
//! `attempt` counts consecutive failures, starting at 1 for the first failure.
//!
//! # Strategies
//! - [`FixedBackoff`]: same delay every time (5s on the deployed device)
//! - [`ExponentialBackoff`]: doubles per failure up to a cap
//! - [`Jittered`]: adds a random spread on top of any other strategy so a fleet
//!   of wristbands does not reconnect in lockstep after a broker outage

use embassy_time::Duration;
use nanorand::{Rng, WyRand};

/// Delay strategy between consecutive connection attempts
pub trait BackoffPolicy {
    fn next_delay(&mut self, attempt: u32) -> Duration;
}

/// Constant delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn next_delay(&mut self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// `base * 2^(attempt - 1)`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << doublings;
        let ticks = self.base.as_ticks().saturating_mul(factor);
        Duration::from_ticks(ticks).min(self.max)
    }
}

/// Adds a uniformly distributed extra delay in `[0, spread]`
pub struct Jittered<B> {
    inner: B,
    spread: Duration,
    rng: WyRand,
}

impl<B: BackoffPolicy> Jittered<B> {
    /// `seed` should come from a hardware entropy source on the device
    pub fn new(inner: B, spread: Duration, seed: u64) -> Self {
        Self {
            inner,
            spread,
            rng: WyRand::new_seed(seed),
        }
    }
}

impl<B: BackoffPolicy> BackoffPolicy for Jittered<B> {
    fn next_delay(&mut self, attempt: u32) -> Duration {
        let jitter = self.rng.generate_range(0..=self.spread.as_ticks());
        let delay = self.inner.next_delay(attempt).as_ticks();
        Duration::from_ticks(delay.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_never_grows() {
        let mut backoff = FixedBackoff::new(Duration::from_secs(5));

        for attempt in [1, 2, 10, u32::MAX] {
            assert_eq!(backoff.next_delay(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(backoff.next_delay(1), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(2), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(3), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(5), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(6), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn exponential_backoff_treats_attempt_zero_as_first() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(8));

        assert_eq!(backoff.next_delay(0), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let mut backoff = Jittered::new(
            FixedBackoff::new(Duration::from_secs(5)),
            Duration::from_millis(500),
            0x5eed,
        );

        for attempt in 1..200 {
            let delay = backoff.next_delay(attempt);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_millis(5500));
        }
    }

    #[test]
    fn jitter_on_an_unbounded_delay_saturates() {
        let mut backoff = Jittered::new(
            ExponentialBackoff::new(Duration::from_secs(1), Duration::MAX),
            Duration::from_secs(1),
            7,
        );

        for attempt in [1, 40, 64, u32::MAX] {
            assert!(backoff.next_delay(attempt) >= Duration::from_secs(1));
        }
        assert_eq!(backoff.next_delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn jitter_is_reproducible_for_a_seed() {
        let make = || {
            Jittered::new(
                ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60)),
                Duration::from_secs(1),
                42,
            )
        };
        let (mut a, mut b) = (make(), make());

        for attempt in 1..20 {
            assert_eq!(a.next_delay(attempt), b.next_delay(attempt));
        }
    }
}
