//! The advisor facade
//!
//! `IndexAdvisor` composes the gateway, the statistics provider, the SQL
//! analyser, the plan inspector and the recommender behind one synchronous
//! entry point. It is thread-safe and reentrant: concurrent passes share
//! the session pool and the statistics cache and nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use idxadv_core::{
    sql_fingerprint, AdvisorError, AdvisorOptions, DbConfig, PlanMetrics, Result, ScanRecord,
};
use idxadv_gateway::{CatalogSource, DbGateway, PlanSource, StatsProvider};

use crate::explain::PlanInspector;
use crate::parser::SqlAnalyser;
use crate::recommend::{Proposal, Recommender};

/// Caller-supplied cancellation signal.
///
/// Checked at the safe boundaries between pipeline stages; a cancelled
/// pass discards partial results and returns `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of one recommendation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub fingerprint: String,
    pub metrics: PlanMetrics,
    pub scans: Vec<ScanRecord>,
    /// Ordered by descending predicted improvement; may be empty
    pub proposals: Vec<Proposal>,
    /// Set when the analyser could not parse the statement and the pass
    /// degraded to plan-only output
    pub parse_failure: Option<String>,
}

/// The index recommendation engine
pub struct IndexAdvisor {
    plans: Arc<dyn PlanSource>,
    stats: StatsProvider,
    options: RwLock<AdvisorOptions>,
    gateway: Option<Arc<DbGateway>>,
}

impl IndexAdvisor {
    /// Connect to the target database with the given tunables.
    pub fn connect(db: &DbConfig, options: AdvisorOptions) -> Result<Self> {
        options.validate()?;
        let gateway = Arc::new(DbGateway::connect(db, &options)?);
        let stats = StatsProvider::new(
            Arc::clone(&gateway) as Arc<dyn CatalogSource>,
            Duration::from_secs(options.stats_cache_ttl_s),
        );
        Ok(Self {
            plans: Arc::clone(&gateway) as Arc<dyn PlanSource>,
            stats,
            options: RwLock::new(options),
            gateway: Some(gateway),
        })
    }

    /// Build an advisor over arbitrary plan and catalog sources.
    ///
    /// Used by tests and by embedders that already own a gateway.
    pub fn with_sources(
        plans: Arc<dyn PlanSource>,
        catalog: Arc<dyn CatalogSource>,
        options: AdvisorOptions,
    ) -> Result<Self> {
        options.validate()?;
        let ttl = Duration::from_secs(options.stats_cache_ttl_s);
        Ok(Self {
            plans,
            stats: StatsProvider::new(catalog, ttl),
            options: RwLock::new(options),
            gateway: None,
        })
    }

    /// Analyse a statement without executing it.
    pub fn analyse(&self, sql: &str) -> Result<Analysis> {
        self.run(sql, false, &CancelHandle::new())
    }

    /// Analyse a statement under `EXPLAIN ANALYZE` for observed row
    /// counts. Mutating statements are refused by the gateway.
    pub fn analyse_executed(&self, sql: &str) -> Result<Analysis> {
        self.run(sql, true, &CancelHandle::new())
    }

    /// Like `analyse`, with a cancellation signal.
    pub fn analyse_with_cancel(&self, sql: &str, cancel: &CancelHandle) -> Result<Analysis> {
        self.run(sql, false, cancel)
    }

    #[tracing::instrument(skip(self, sql, cancel))]
    fn run(&self, sql: &str, analyze: bool, cancel: &CancelHandle) -> Result<Analysis> {
        let fingerprint = sql_fingerprint(sql);
        let options = self.options.read().clone();

        if cancel.is_cancelled() {
            return Err(AdvisorError::Cancelled);
        }

        // A statement our analyser cannot model may still explain fine;
        // degrade to plan-only output instead of failing the pass.
        let (parsed, parse_failure) = match SqlAnalyser::parse(sql) {
            Ok(parsed) => (Some(parsed), None),
            Err(AdvisorError::UnparseableStatement { reason, .. }) => {
                tracing::warn!(%fingerprint, reason = %reason, "analyser failed, plan-only mode");
                (None, Some(reason))
            }
            Err(other) => return Err(other),
        };

        let raw = self
            .plans
            .run_explain(sql, analyze, options.explain_timeout_ms)?;
        if cancel.is_cancelled() {
            return Err(AdvisorError::Cancelled);
        }

        let (metrics, scans) = PlanInspector::inspect(&raw).map_err(|e| match e {
            AdvisorError::PlanUnparseable { reason, .. } => AdvisorError::PlanUnparseable {
                fingerprint: fingerprint.clone(),
                reason,
            },
            other => other,
        })?;

        let proposals = match &parsed {
            Some(parsed) => {
                if cancel.is_cancelled() {
                    return Err(AdvisorError::Cancelled);
                }
                Recommender::new(&self.stats, &options).recommend(parsed, &scans, &metrics)
            }
            None => Vec::new(),
        };

        tracing::info!(
            %fingerprint,
            scans = scans.len(),
            proposals = proposals.len(),
            "recommendation pass complete"
        );
        Ok(Analysis {
            fingerprint,
            metrics,
            scans,
            proposals,
            parse_failure,
        })
    }

    /// Apply new tunables.
    ///
    /// Cache TTL and recommendation switches take effect immediately; the
    /// pool bounds apply on the next `connect`.
    pub fn configure(&self, options: AdvisorOptions) -> Result<()> {
        options.validate()?;
        self.stats
            .set_ttl(Duration::from_secs(options.stats_cache_ttl_s));
        let mut current = self.options.write();
        if options.pool_min != current.pool_min || options.pool_max != current.pool_max {
            tracing::info!("pool bounds change recorded; applies on next connect");
        }
        *current = options;
        Ok(())
    }

    pub fn options(&self) -> AdvisorOptions {
        self.options.read().clone()
    }

    /// Release pooled sessions and drop cached statistics.
    pub fn close(&self) {
        if let Some(gateway) = &self.gateway {
            gateway.close();
        }
        self.stats.clear();
    }
}
