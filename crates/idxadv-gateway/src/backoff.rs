//! Exponential backoff for transient gateway failures

use std::time::Duration;

/// Exponential backoff schedule.
///
/// Delay doubles per attempt, capped at a maximum. The gateway retries
/// transient connection failures at most three times, so the schedule
/// stays short.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms.max(1),
            max_ms: max_ms.max(initial_ms),
        }
    }

    /// Delay before the retry with the given zero-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_ms);
        Duration::from_millis(ms)
    }
}

impl Default for Backoff {
    /// 100 ms initial delay, capped at 2 seconds
    fn default() -> Self {
        Self::new(100, 2_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let backoff = Backoff::new(100, 30_000);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = Backoff::new(100, 500);
        assert_eq!(backoff.delay(10), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_initial_is_bumped() {
        let backoff = Backoff::new(0, 100);
        assert_eq!(backoff.delay(0), Duration::from_millis(1));
    }
}
