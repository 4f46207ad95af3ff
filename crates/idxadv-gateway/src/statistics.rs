//! Cached statistics provider
//!
//! Catalog lookups are cheap but not free, and one recommendation pass can
//! ask about the same column several times. The provider keeps resolved
//! statistics behind a TTL cache keyed by `(table, column)` (column stats)
//! and `table` (health). Readers get `Arc` snapshots; entries are never
//! mutated in place, so a racing refresh is benign.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use idxadv_core::{ColumnStats, Result, TableHealth};

/// Read-only catalog access, implemented by the gateway and by test fakes
pub trait CatalogSource: Send + Sync {
    fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats>;
    fn table_health(&self, table: &str) -> Result<TableHealth>;
}

struct CacheEntry<T> {
    value: Arc<T>,
    inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() <= ttl
    }
}

/// TTL cache over a catalog source
pub struct StatsProvider {
    source: Arc<dyn CatalogSource>,
    ttl_ms: AtomicU64,
    columns: Mutex<HashMap<(String, String), CacheEntry<ColumnStats>>>,
    tables: Mutex<HashMap<String, CacheEntry<TableHealth>>>,
}

impl StatsProvider {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl_ms: AtomicU64::new(ttl.as_millis() as u64),
            columns: Mutex::new(HashMap::new()),
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    /// Change the TTL for subsequent freshness checks; existing entries are
    /// re-evaluated against the new value on access.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(ttl.as_millis() as u64, Ordering::Relaxed);
    }

    /// Statistics for one column, cached.
    ///
    /// Failures are not cached; the next call asks the catalog again.
    pub fn column_stats(&self, table: &str, column: &str) -> Result<Arc<ColumnStats>> {
        let key = (table.to_string(), column.to_string());
        let ttl = self.ttl();
        if let Some(entry) = self.columns.lock().get(&key) {
            if entry.fresh(ttl) {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let fetched = Arc::new(self.source.column_stats(table, column)?);
        tracing::debug!(table, column, "column statistics refreshed");
        self.columns.lock().insert(
            key,
            CacheEntry {
                value: Arc::clone(&fetched),
                inserted_at: Instant::now(),
            },
        );
        Ok(fetched)
    }

    /// Indexing health for one table, cached.
    pub fn table_health(&self, table: &str) -> Result<Arc<TableHealth>> {
        let ttl = self.ttl();
        if let Some(entry) = self.tables.lock().get(table) {
            if entry.fresh(ttl) {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let fetched = Arc::new(self.source.table_health(table)?);
        self.tables.lock().insert(
            table.to_string(),
            CacheEntry {
                value: Arc::clone(&fetched),
                inserted_at: Instant::now(),
            },
        );
        Ok(fetched)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.columns.lock().clear();
        self.tables.lock().clear();
    }
}
