//! Exponential backoff shared by the upstream reconnect loop and the
//! network reachability gate.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on the delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Backoff starting at one second and capped at `max_delay`.
    pub fn capped(max_delay: Duration) -> Self {
        Self {
            max_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `delay = min(min(initial * 2^attempt, max) * jitter, max)`
    ///
    /// Jitter is +-25% so a fleet rebooting together does not retry in
    /// lockstep. The result never exceeds `max_delay`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::as_conversions)]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(31) as i32;
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        let with_jitter = (capped * jitter_factor).clamp(0.0, self.max_delay.as_secs_f64());

        Duration::from_secs_f64(with_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff() {
        let backoff = Backoff::default();
        assert_eq!(backoff.initial_delay, Duration::from_secs(1));
        assert_eq!(backoff.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn delay_increases_exponentially() {
        let backoff = Backoff::default();

        let d0 = backoff.delay(0);
        let d1 = backoff.delay(1);
        let d2 = backoff.delay(2);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn delay_caps_at_max() {
        let backoff = Backoff::capped(Duration::from_secs(10));

        let d10 = backoff.delay(10);
        assert!(d10 <= Duration::from_secs(10), "{d10:?} not capped");

        let huge = backoff.delay(u32::MAX);
        assert!(huge <= Duration::from_secs(10), "{huge:?} not capped");
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let max = Duration::from_secs(60);
        let backoff = Backoff::capped(max);
        for attempt in 0..64 {
            let delay = backoff.delay(attempt);
            assert!(delay <= max, "attempt {attempt}: {delay:?} exceeds {max:?}");
        }
    }
}
