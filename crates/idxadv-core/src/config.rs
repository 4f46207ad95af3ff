//! Connection and tuning configuration
//!
//! `DbConfig` describes how to reach the target database and falls back to
//! `IDXADV_DB_*` environment variables for anything not set explicitly.
//! `AdvisorOptions` carries the recognised tunables with their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// Target database connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Build a config from `IDXADV_DB_HOST`, `IDXADV_DB_PORT`,
    /// `IDXADV_DB_NAME`, `IDXADV_DB_USER` and `IDXADV_DB_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok();
        let host = var("IDXADV_DB_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match var("IDXADV_DB_PORT") {
            Some(p) => p.parse::<u16>().map_err(|_| {
                AdvisorError::Configuration(format!("IDXADV_DB_PORT is not a port number: {p}"))
            })?,
            None => 5432,
        };
        let database = var("IDXADV_DB_NAME").ok_or_else(|| {
            AdvisorError::Configuration("IDXADV_DB_NAME not set".to_string())
        })?;
        let user = var("IDXADV_DB_USER").ok_or_else(|| {
            AdvisorError::Configuration("IDXADV_DB_USER not set".to_string())
        })?;
        let password = var("IDXADV_DB_PASSWORD").ok_or_else(|| {
            AdvisorError::Configuration("IDXADV_DB_PASSWORD not set".to_string())
        })?;
        Ok(Self::new(host, port, database, user, password))
    }

    /// Render as a `tokio-postgres` connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Recognised advisor tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorOptions {
    /// Connections kept warm in the pool
    pub pool_min: usize,
    /// Upper bound on pooled connections
    pub pool_max: usize,
    /// Deadline for each explain round-trip
    pub explain_timeout_ms: u64,
    /// Time-to-live for cached column statistics and table health
    pub stats_cache_ttl_s: u64,
    /// Parallelism hint for the external batch collaborator
    pub max_workers_per_batch: usize,
    pub covering_enabled: bool,
    pub partial_enabled: bool,
}

impl Default for AdvisorOptions {
    fn default() -> Self {
        Self {
            pool_min: 2,
            pool_max: 10,
            explain_timeout_ms: 30_000,
            stats_cache_ttl_s: 3_600,
            max_workers_per_batch: 4,
            covering_enabled: true,
            partial_enabled: true,
        }
    }
}

impl AdvisorOptions {
    pub fn with_pool_bounds(mut self, min: usize, max: usize) -> Self {
        self.pool_min = min;
        self.pool_max = max;
        self
    }

    pub fn with_explain_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.explain_timeout_ms = timeout_ms;
        self
    }

    pub fn with_stats_cache_ttl_s(mut self, ttl_s: u64) -> Self {
        self.stats_cache_ttl_s = ttl_s;
        self
    }

    pub fn with_covering_enabled(mut self, enabled: bool) -> Self {
        self.covering_enabled = enabled;
        self
    }

    pub fn with_partial_enabled(mut self, enabled: bool) -> Self {
        self.partial_enabled = enabled;
        self
    }

    /// Reject option combinations the pool or gateway cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.pool_max == 0 {
            return Err(AdvisorError::Configuration(
                "pool_max must be at least 1".to_string(),
            ));
        }
        if self.pool_min > self.pool_max {
            return Err(AdvisorError::Configuration(format!(
                "pool_min ({}) cannot exceed pool_max ({})",
                self.pool_min, self.pool_max
            )));
        }
        if self.explain_timeout_ms == 0 {
            return Err(AdvisorError::Configuration(
                "explain_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
