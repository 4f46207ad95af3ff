//! The database gateway
//!
//! `DbGateway` is the synchronous facade the advisor talks to. It owns a
//! dedicated tokio runtime driving the async session pool, enforces the
//! explain safety rules, and retries transient failures with backoff.
//!
//! Safety rules for `run_explain`:
//! 1. the statement is classified by its leading token;
//! 2. `analyze = true` on anything but a read statement is refused before
//!    any session is acquired;
//! 3. analysed explains run inside a transaction with a session-scoped
//!    statement timeout, rolled back on every exit path;
//! 4. the whole round-trip carries a client-side deadline as well.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Runtime;

use idxadv_core::{
    sql_fingerprint, AdvisorError, AdvisorOptions, ColumnStats, DbConfig, Result, StatementKind,
    TableHealth,
};

use crate::backoff::Backoff;
use crate::placeholders::substitute_placeholders;
use crate::pool::{PoolConfig, PoolStats, SessionPool};
use crate::session::{DbSession, PgSessionFactory, StatementSummary};
use crate::statistics::CatalogSource;

/// Maximum attempts for operations hit by transient connection failures
const MAX_ATTEMPTS: u32 = 3;

/// Source of explained plans, implemented by the gateway and by test fakes
pub trait PlanSource: Send + Sync {
    fn run_explain(&self, stmt: &str, analyze: bool, timeout_ms: u64) -> Result<Value>;
}

/// Synchronous gateway over the pooled session layer
pub struct DbGateway {
    runtime: Runtime,
    pool: Arc<SessionPool>,
    backoff: Backoff,
}

impl DbGateway {
    /// Open the gateway and pre-warm `pool_min` sessions.
    pub fn connect(db: &DbConfig, opts: &AdvisorOptions) -> Result<Self> {
        opts.validate()?;
        let runtime = build_runtime()?;
        let pool_config = PoolConfig::new(opts.pool_min, opts.pool_max)
            .with_acquire_timeout_ms(opts.explain_timeout_ms);
        let pool = Arc::new(SessionPool::new(
            pool_config,
            PgSessionFactory::new(db.clone()),
        ));
        runtime.block_on(pool.warm(opts.pool_min))?;
        tracing::info!(
            pool_min = opts.pool_min,
            pool_max = opts.pool_max,
            "gateway connected"
        );
        Ok(Self {
            runtime,
            pool,
            backoff: Backoff::default(),
        })
    }

    pub(crate) fn with_pool(runtime: Runtime, pool: Arc<SessionPool>) -> Self {
        Self {
            runtime,
            pool,
            backoff: Backoff::new(1, 10),
        }
    }

    /// Run an explanatory form of `stmt` and return the raw JSON plan.
    #[tracing::instrument(skip(self, stmt))]
    pub fn run_explain(&self, stmt: &str, analyze: bool, timeout_ms: u64) -> Result<Value> {
        let fingerprint = sql_fingerprint(stmt);
        let kind = StatementKind::classify(stmt);
        if analyze && !kind.is_read() {
            tracing::warn!(%fingerprint, %kind, "refusing analysed explain of mutating statement");
            return Err(AdvisorError::RefusedMutatingExplain { fingerprint, kind });
        }

        let prepared = substitute_placeholders(stmt);
        let explain_sql = if analyze {
            format!("EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON) {prepared}")
        } else {
            format!("EXPLAIN (FORMAT JSON) {prepared}")
        };

        let pool = Arc::clone(&self.pool);
        let backoff = self.backoff;
        let result = self.runtime.block_on(retry(backoff, || {
            let pool = Arc::clone(&pool);
            let explain_sql = explain_sql.clone();
            async move {
                let session = pool.acquire().await?;
                explain_on_session(&*session, &explain_sql, analyze, timeout_ms).await
            }
        }));
        result.map_err(|e| enrich_explain_error(e, &fingerprint, timeout_ms))
    }

    /// Column distribution statistics, falling back to defaults when the
    /// catalog has no entry for the column.
    pub fn fetch_column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        let pool = Arc::clone(&self.pool);
        let raw = self.runtime.block_on(retry(self.backoff, || {
            let pool = Arc::clone(&pool);
            let table = table.to_string();
            let column = column.to_string();
            async move {
                let session = pool.acquire().await?;
                session.column_stats(&table, &column).await
            }
        }))?;
        match raw {
            Some(r) => Ok(ColumnStats::from_catalog(
                r.n_distinct,
                r.null_frac,
                r.correlation,
                r.row_count,
            )),
            None => {
                tracing::debug!(table, column, "no catalog statistics, using fallback");
                Ok(ColumnStats::fallback())
            }
        }
    }

    /// Index count and write ratio for a table.
    pub fn fetch_table_health(&self, table: &str) -> Result<TableHealth> {
        let pool = Arc::clone(&self.pool);
        let raw = self.runtime.block_on(retry(self.backoff, || {
            let pool = Arc::clone(&pool);
            let table = table.to_string();
            async move {
                let session = pool.acquire().await?;
                session.table_health(&table).await
            }
        }))?;
        match raw {
            Some(r) => Ok(TableHealth::from_counters(r.index_count, r.writes, r.reads)),
            None => Ok(TableHealth::from_counters(0, 0, 0)),
        }
    }

    /// Most expensive statements from the history view, for the external
    /// batch collaborator.
    pub fn fetch_top_statements(
        &self,
        limit: i64,
        min_calls: i64,
    ) -> Result<Vec<StatementSummary>> {
        let pool = Arc::clone(&self.pool);
        self.runtime.block_on(retry(self.backoff, || {
            let pool = Arc::clone(&pool);
            async move {
                let session = pool.acquire().await?;
                session.top_statements(limit, min_calls).await
            }
        }))
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close every pooled session.
    pub fn close(&self) {
        self.runtime.block_on(self.pool.close_all());
        tracing::info!("gateway closed");
    }
}

impl PlanSource for DbGateway {
    fn run_explain(&self, stmt: &str, analyze: bool, timeout_ms: u64) -> Result<Value> {
        DbGateway::run_explain(self, stmt, analyze, timeout_ms)
    }
}

impl CatalogSource for DbGateway {
    fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        self.fetch_column_stats(table, column)
    }

    fn table_health(&self, table: &str) -> Result<TableHealth> {
        self.fetch_table_health(table)
    }
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("idxadv-gateway")
        .build()
        .map_err(|e| AdvisorError::Configuration(format!("failed to start gateway runtime: {e}")))
}

/// Run the analysed or plain explain on one session.
///
/// The transaction around the analysed form serves two purposes: `SET
/// LOCAL` scopes the statement timeout to it, and the closing rollback
/// undoes anything the analysed statement touched. The rollback runs on
/// every exit path, including the deadline one.
async fn explain_on_session(
    session: &dyn DbSession,
    explain_sql: &str,
    analyze: bool,
    timeout_ms: u64,
) -> Result<Value> {
    let deadline = Duration::from_millis(timeout_ms);
    if analyze {
        session.execute("BEGIN").await?;
        let guarded = async {
            session
                .execute(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
                .await?;
            session.query_json(explain_sql).await
        };
        let outcome = tokio::time::timeout(deadline, guarded).await;
        let _ = session.execute("ROLLBACK").await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(AdvisorError::ExplainTimeout {
                fingerprint: String::new(),
                timeout_ms,
            }),
        }
    } else {
        match tokio::time::timeout(deadline, session.query_json(explain_sql)).await {
            Ok(result) => result,
            Err(_) => Err(AdvisorError::ExplainTimeout {
                fingerprint: String::new(),
                timeout_ms,
            }),
        }
    }
}

/// Fill in the context the session layer could not know.
fn enrich_explain_error(err: AdvisorError, fingerprint: &str, timeout_ms: u64) -> AdvisorError {
    match err {
        AdvisorError::ExplainTimeout { .. } => AdvisorError::ExplainTimeout {
            fingerprint: fingerprint.to_string(),
            timeout_ms,
        },
        AdvisorError::PlanUnparseable { reason, .. } => AdvisorError::PlanUnparseable {
            fingerprint: fingerprint.to_string(),
            reason,
        },
        other => other,
    }
}

/// Retry transient failures up to `MAX_ATTEMPTS` with backoff.
async fn retry<T, F, Fut>(backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!(error = %e, attempt, "transient gateway failure, retrying");
                tokio::time::sleep(backoff.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
