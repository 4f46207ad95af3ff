//! Pool statistics snapshot

/// Point-in-time view of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total sessions known to the pool (idle + active)
    pub total: usize,
    pub idle: usize,
    pub active: usize,
    /// Callers currently blocked in `acquire`
    pub waiting: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
        }
    }

    /// Utilisation of the currently open sessions, in [0, 1].
    pub fn utilisation(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.active as f64 / self.total as f64
    }
}
