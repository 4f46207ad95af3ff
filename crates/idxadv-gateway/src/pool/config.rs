//! Pool sizing and lifecycle configuration

use std::time::Duration;

/// Configuration for the session pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Sessions opened eagerly when the gateway connects
    min_size: usize,
    /// Hard cap on concurrently open sessions
    max_size: usize,
    acquire_timeout_ms: u64,
    idle_timeout_ms: u64,
    max_lifetime_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a pool configuration with the given bounds.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0 or `min_size > max_size`. Callers going
    /// through `AdvisorOptions::validate` never hit these.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(max_size > 0, "max_size must be greater than 0");
        assert!(
            min_size <= max_size,
            "min_size ({min_size}) cannot exceed max_size ({max_size})"
        );
        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
        }
    }

    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// Defaults mirror the advisor's contract: 2 warm sessions, 10 max.
    fn default() -> Self {
        Self::new(2, 10)
    }
}
