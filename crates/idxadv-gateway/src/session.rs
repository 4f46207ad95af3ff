//! Database session abstraction
//!
//! `DbSession` is the narrow, read-only surface the gateway needs from the
//! DBMS. The production implementation wraps a `tokio_postgres::Client`;
//! tests substitute mocks through `SessionFactory`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

use idxadv_core::{AdvisorError, DbConfig, Result};

/// Raw per-column numbers from the statistics catalog, before resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawColumnStats {
    pub n_distinct: f64,
    pub null_frac: f64,
    pub correlation: f64,
    pub row_count: i64,
}

/// Raw per-table activity counters from the catalog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTableHealth {
    pub index_count: i64,
    pub writes: i64,
    pub reads: i64,
}

/// One entry from the statement-history view, for the batch collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSummary {
    pub query: String,
    pub query_id: String,
    pub calls: i64,
    pub total_exec_ms: f64,
    pub mean_exec_ms: f64,
    pub rows: i64,
}

/// A single database session
#[async_trait]
pub trait DbSession: Send + Sync {
    /// Run a statement for its side effects (BEGIN, SET LOCAL, ROLLBACK).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run an explain statement and return its JSON payload.
    async fn query_json(&self, sql: &str) -> Result<Value>;

    /// Fetch raw column statistics, `None` when the catalog has no entry.
    async fn column_stats(&self, table: &str, column: &str) -> Result<Option<RawColumnStats>>;

    /// Fetch raw table activity counters, `None` for unknown tables.
    async fn table_health(&self, table: &str) -> Result<Option<RawTableHealth>>;

    /// Fetch the most expensive statements from the history view.
    async fn top_statements(&self, limit: i64, min_calls: i64) -> Result<Vec<StatementSummary>>;

    fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Factory trait for creating new sessions
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn DbSession>>;

    /// Validate that a pooled session is still usable.
    async fn validate(&self, session: &dyn DbSession) -> bool {
        !session.is_closed()
    }
}

const COLUMN_STATS_SQL: &str = "\
SELECT COALESCE(s.n_distinct, 0)::float8, \
       COALESCE(s.null_frac, 0)::float8, \
       COALESCE(s.correlation, 0)::float8, \
       c.reltuples::bigint \
FROM pg_stats s \
JOIN pg_class c ON c.relname = s.tablename \
JOIN pg_namespace n ON n.oid = c.relnamespace AND n.nspname = s.schemaname \
WHERE s.schemaname = 'public' AND s.tablename = $1 AND s.attname = $2";

const TABLE_HEALTH_SQL: &str = "\
SELECT (SELECT count(*) FROM pg_indexes i \
        WHERE i.schemaname = 'public' AND i.tablename = t.relname)::bigint, \
       (COALESCE(t.n_tup_ins, 0) + COALESCE(t.n_tup_upd, 0) + COALESCE(t.n_tup_del, 0))::bigint, \
       (COALESCE(t.seq_scan, 0) + COALESCE(t.idx_scan, 0))::bigint \
FROM pg_stat_user_tables t \
WHERE t.schemaname = 'public' AND t.relname = $1";

const TOP_STATEMENTS_SQL: &str = "\
SELECT query, queryid::text, calls, total_exec_time, mean_exec_time, rows \
FROM pg_stat_statements \
WHERE calls >= $1 \
  AND query NOT ILIKE 'pg_%' \
  AND query NOT ILIKE 'information_schema%' \
  AND query NOT ILIKE 'COMMIT' \
  AND query NOT ILIKE 'BEGIN' \
  AND query NOT ILIKE 'ROLLBACK' \
  AND query NOT ILIKE 'SET %' \
  AND query NOT ILIKE 'SHOW %' \
  AND query NOT ILIKE 'EXPLAIN%' \
ORDER BY total_exec_time DESC \
LIMIT $2";

/// PostgreSQL session over `tokio-postgres`
pub struct PostgresSession {
    client: Client,
    closed: AtomicBool,
}

impl PostgresSession {
    fn new(client: Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }
}

/// True for errors that mean the session itself is unusable.
fn is_connection_error(err: &tokio_postgres::Error) -> bool {
    err.is_closed() || err.as_db_error().is_none()
}

fn map_execute_error(err: tokio_postgres::Error) -> AdvisorError {
    AdvisorError::ConnectionFailure(err.to_string())
}

fn map_explain_error(err: tokio_postgres::Error) -> AdvisorError {
    if let Some(db) = err.as_db_error() {
        if *db.code() == SqlState::QUERY_CANCELED {
            // Enriched with the fingerprint and deadline by the gateway.
            return AdvisorError::ExplainTimeout {
                fingerprint: String::new(),
                timeout_ms: 0,
            };
        }
        return AdvisorError::PlanUnparseable {
            fingerprint: String::new(),
            reason: db.message().to_string(),
        };
    }
    AdvisorError::ConnectionFailure(err.to_string())
}

fn map_catalog_error(err: tokio_postgres::Error, table: &str, column: &str) -> AdvisorError {
    if is_connection_error(&err) {
        return AdvisorError::ConnectionFailure(err.to_string());
    }
    AdvisorError::StatisticsUnavailable {
        table: table.to_string(),
        column: column.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl DbSession for PostgresSession {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(map_execute_error)
    }

    async fn query_json(&self, sql: &str) -> Result<Value> {
        let rows = self
            .client
            .query(sql, &[])
            .await
            .map_err(map_explain_error)?;
        let row = rows.first().ok_or_else(|| AdvisorError::PlanUnparseable {
            fingerprint: String::new(),
            reason: "explain returned no rows".to_string(),
        })?;
        // The payload column is json on modern servers, text on older ones.
        if let Ok(value) = row.try_get::<_, Value>(0) {
            return Ok(value);
        }
        let text: String = row.try_get(0).map_err(|e| AdvisorError::PlanUnparseable {
            fingerprint: String::new(),
            reason: format!("explain payload not readable: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| AdvisorError::PlanUnparseable {
            fingerprint: String::new(),
            reason: format!("explain payload not valid JSON: {e}"),
        })
    }

    async fn column_stats(&self, table: &str, column: &str) -> Result<Option<RawColumnStats>> {
        let row = self
            .client
            .query_opt(COLUMN_STATS_SQL, &[&table, &column])
            .await
            .map_err(|e| map_catalog_error(e, table, column))?;
        let Some(row) = row else { return Ok(None) };
        let stats = RawColumnStats {
            n_distinct: row
                .try_get(0)
                .map_err(|e| map_catalog_error(e, table, column))?,
            null_frac: row
                .try_get(1)
                .map_err(|e| map_catalog_error(e, table, column))?,
            correlation: row
                .try_get(2)
                .map_err(|e| map_catalog_error(e, table, column))?,
            row_count: row
                .try_get(3)
                .map_err(|e| map_catalog_error(e, table, column))?,
        };
        Ok(Some(stats))
    }

    async fn table_health(&self, table: &str) -> Result<Option<RawTableHealth>> {
        let row = self
            .client
            .query_opt(TABLE_HEALTH_SQL, &[&table])
            .await
            .map_err(|e| map_catalog_error(e, table, "*"))?;
        let Some(row) = row else { return Ok(None) };
        let health = RawTableHealth {
            index_count: row.try_get(0).map_err(|e| map_catalog_error(e, table, "*"))?,
            writes: row.try_get(1).map_err(|e| map_catalog_error(e, table, "*"))?,
            reads: row.try_get(2).map_err(|e| map_catalog_error(e, table, "*"))?,
        };
        Ok(Some(health))
    }

    async fn top_statements(&self, limit: i64, min_calls: i64) -> Result<Vec<StatementSummary>> {
        let rows = self
            .client
            .query(TOP_STATEMENTS_SQL, &[&min_calls, &limit])
            .await
            .map_err(|e| {
                if is_connection_error(&e) {
                    AdvisorError::ConnectionFailure(e.to_string())
                } else {
                    AdvisorError::Configuration(format!(
                        "statement-history view unavailable (is pg_stat_statements installed?): {e}"
                    ))
                }
            })?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(StatementSummary {
                query: row.try_get(0).map_err(map_execute_error)?,
                query_id: row.try_get(1).map_err(map_execute_error)?,
                calls: row.try_get(2).map_err(map_execute_error)?,
                total_exec_ms: row.try_get(3).map_err(map_execute_error)?,
                mean_exec_ms: row.try_get(4).map_err(map_execute_error)?,
                rows: row.try_get(5).map_err(map_execute_error)?,
            });
        }
        Ok(out)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }

    async fn close(&self) -> Result<()> {
        // tokio-postgres closes the wire when the client drops; marking the
        // session closed keeps the pool from handing it out again.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory creating `PostgresSession`s from a connection config
pub struct PgSessionFactory {
    config: DbConfig,
}

impl PgSessionFactory {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn create(&self) -> Result<Arc<dyn DbSession>> {
        tracing::debug!(host = %self.config.host, database = %self.config.database, "opening session");
        let (client, connection) =
            tokio_postgres::connect(&self.config.connection_string(), NoTls)
                .await
                .map_err(|e| AdvisorError::ConnectionFailure(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "session connection task ended with error");
            }
        });
        Ok(Arc::new(PostgresSession::new(client)))
    }
}
