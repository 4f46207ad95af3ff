//! Recommender pipeline tests, including the end-to-end scenarios

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;


use idxadv_core::{
    AdvisorError, AdvisorOptions, ColumnStats, ParsedQuery, PlanMetrics, PredicateRole, Result,
    ScanRecord, TableHealth,
};
use idxadv_gateway::{CatalogSource, StatsProvider};

use crate::parser::SqlAnalyser;

use super::Recommender;

struct MapCatalog {
    columns: HashMap<(String, String), ColumnStats>,
    health: HashMap<String, TableHealth>,
    failing: Vec<(String, String)>,
}

impl MapCatalog {
    fn new() -> Self {
        Self {
            columns: HashMap::new(),
            health: HashMap::new(),
            failing: Vec::new(),
        }
    }

    fn with_column(
        mut self,
        table: &str,
        column: &str,
        distinct: u64,
        null_frac: f64,
        correlation: f64,
        rows: u64,
    ) -> Self {
        self.columns.insert(
            (table.to_string(), column.to_string()),
            ColumnStats {
                distinct_values: distinct,
                null_frac,
                correlation,
                row_count: rows,
                has_stats: true,
            },
        );
        self
    }

    fn with_health(mut self, table: &str, indexes: u64, write_ratio: f64) -> Self {
        self.health.insert(
            table.to_string(),
            TableHealth {
                existing_index_count: indexes,
                write_ratio,
            },
        );
        self
    }

    fn with_failing(mut self, table: &str, column: &str) -> Self {
        self.failing.push((table.to_string(), column.to_string()));
        self
    }

    fn provider(self) -> StatsProvider {
        StatsProvider::new(Arc::new(self), Duration::from_secs(3_600))
    }
}

impl CatalogSource for MapCatalog {
    fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        let key = (table.to_string(), column.to_string());
        if self.failing.contains(&key) {
            return Err(AdvisorError::StatisticsUnavailable {
                table: table.to_string(),
                column: column.to_string(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.columns.get(&key).cloned().unwrap_or_else(ColumnStats::fallback))
    }

    fn table_health(&self, table: &str) -> Result<TableHealth> {
        Ok(self
            .health
            .get(table)
            .cloned()
            .unwrap_or(TableHealth {
                existing_index_count: 0,
                write_ratio: 0.3,
            }))
    }
}

fn parse(sql: &str) -> ParsedQuery {
    SqlAnalyser::parse(sql).unwrap()
}

fn scan(table: &str, rows: u64, removed: u64, cost: f64) -> ScanRecord {
    ScanRecord {
        table: table.to_string(),
        rows_scanned: rows,
        rows_removed_by_filter: removed,
        total_cost: cost,
        depth: 0,
        filter: None,
        output: Vec::new(),
    }
}

fn metrics(cost: f64) -> PlanMetrics {
    PlanMetrics {
        total_cost: cost,
        actual_rows: None,
        execution_ms: None,
        planning_ms: None,
    }
}

mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_highly_selective_equality_column() {
        let parsed = parse("SELECT * FROM users WHERE email = 'x@y.z'");
        let provider = MapCatalog::new()
            .with_column("users", "email", 10_000_000, 0.0, 0.05, 10_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("users", 10_000_000, 9_999_999, 180_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(180_000.0));

        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.table, "users");
        assert_eq!(proposal.columns, vec!["email"]);
        assert_eq!(proposal.filter_predicate, None);
        assert!(proposal.improvement >= 0.96);
        assert_eq!(
            proposal.to_ddl(),
            "CREATE INDEX idx_users_email ON users (email);"
        );
    }

    #[test]
    fn test_constant_equality_becomes_partial_predicate() {
        let parsed = parse(
            "SELECT o.id FROM orders o WHERE o.status = 'pending' \
             AND o.created_at > '2025-01-01'",
        );
        let provider = MapCatalog::new()
            .with_column("orders", "status", 5, 0.0, 0.1, 1_000_000)
            .with_column("orders", "created_at", 900_000, 0.0, 0.95, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("orders", 1_000_000, 999_000, 25_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(25_000.0));

        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.columns, vec!["created_at"]);
        assert_eq!(
            proposal.filter_predicate.as_deref(),
            Some("status = 'pending'")
        );
        assert!(proposal.improvement >= 0.80, "got {}", proposal.improvement);
        assert_eq!(
            proposal.roles.get("status"),
            Some(&PredicateRole::Equality)
        );
        assert_eq!(proposal.roles.get("created_at"), Some(&PredicateRole::Range));
        assert_eq!(
            proposal.to_ddl(),
            "CREATE INDEX idx_orders_created_at_partial ON orders (created_at) \
             WHERE status = 'pending';"
        );
    }

    #[test]
    fn test_covering_index_from_projection() {
        let parsed = parse("SELECT a, b FROM t WHERE k = 7");
        let provider = MapCatalog::new()
            .with_column("t", "k", 100_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let mut s = scan("t", 1_000_000, 999_990, 5_000.0);
        s.output = vec!["t.a".into(), "t.b".into(), "t.k".into()];
        let proposals = recommender.recommend(&parsed, &[s], &metrics(5_000.0));

        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.columns, vec!["k"]);
        assert_eq!(proposal.include_columns, vec!["a", "b"]);
        assert_eq!(proposal.filter_predicate, None);
        assert_eq!(proposal.improvement, 0.98);
        assert_eq!(
            proposal.to_ddl(),
            "CREATE INDEX idx_t_k_covering ON t (k) INCLUDE (a, b);"
        );
    }

    #[test]
    fn test_covering_boost_below_the_cap() {
        let parsed = parse("SELECT a FROM t WHERE k = 7");
        let provider = MapCatalog::new()
            .with_column("t", "k", 100_000, 0.0, 0.9, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let mut covered = scan("t", 1_000_000, 999_990, 5_000.0);
        covered.output = vec!["t.a".into(), "t.k".into()];
        let with_cover = recommender.recommend(&parsed, &[covered], &metrics(5_000.0));

        let plain = scan("t", 1_000_000, 999_990, 5_000.0);
        let without_cover = recommender.recommend(&parsed, &[plain], &metrics(5_000.0));

        let boosted = with_cover[0].improvement;
        let base = without_cover[0].improvement;
        assert!((boosted - (base * 1.15)).abs() < 1e-9);
        assert!(boosted < 0.98);
    }

    #[test]
    fn test_equality_then_range_with_partial_extraction() {
        let parsed = parse("SELECT * FROM t WHERE k1 = 3 AND k2 > 10");
        let provider = MapCatalog::new()
            .with_column("t", "k1", 1_000, 0.0, 0.0, 1_000_000)
            .with_column("t", "k2", 50, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000_000, 999_500, 30_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(30_000.0));

        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.columns, vec!["k2"]);
        assert_eq!(proposal.filter_predicate.as_deref(), Some("k1 = 3"));
        assert_eq!(proposal.roles.get("k1"), Some(&PredicateRole::Equality));
        assert_eq!(proposal.roles.get("k2"), Some(&PredicateRole::Range));
        assert_eq!(
            proposal.to_ddl(),
            "CREATE INDEX idx_t_k2_partial ON t (k2) WHERE k1 = 3;"
        );
    }

    #[test]
    fn test_over_indexed_write_heavy_table_gets_warning() {
        let parsed = parse("SELECT * FROM hot WHERE k = 'v'");
        let provider = MapCatalog::new()
            .with_column("hot", "k", 10_000, 0.0, 0.0, 1_000_000)
            .with_health("hot", 7, 0.7)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("hot", 1_000_000, 999_000, 10_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(10_000.0));

        assert_eq!(proposals.len(), 1);
        let warning = proposals[0].warning.as_deref().unwrap();
        assert!(warning.contains("7 indexes"));
        assert!(warning.contains("write-heavy"));
    }
}

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partitions_equality_range_other_then_order_by() {
        let parsed = parse(
            "SELECT * FROM t WHERE a > 0 AND b = c AND d LIKE 'x%' ORDER BY e",
        );
        let provider = MapCatalog::new()
            .with_column("t", "b", 1_000, 0.0, 0.0, 1_000_000)
            .with_column("t", "c", 10, 0.0, 0.0, 1_000_000)
            .with_column("t", "a", 100, 0.0, 0.0, 1_000_000)
            .with_column("t", "d", 100, 0.0, 0.0, 1_000_000)
            .with_column("t", "e", 100, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000, 900, 100.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(100.0));

        assert_eq!(proposals.len(), 1);
        // b (equality, 1e-3) before c (equality, 0.1), then the range
        // column, then the pattern filter, then the order-by column.
        assert_eq!(proposals[0].columns, vec!["b", "c", "a", "d", "e"]);
        assert_eq!(proposals[0].roles.get("e"), Some(&PredicateRole::OrderBy));
    }

    #[test]
    fn test_order_by_only_candidates_still_propose() {
        let parsed = parse("SELECT * FROM t ORDER BY created_at");
        let provider = MapCatalog::new()
            .with_column("t", "created_at", 1_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000_000, 0, 40_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(40_000.0));

        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].columns, vec!["created_at"]);
        // a leading column is never tagged order-by
        assert_eq!(
            proposals[0].roles.get("created_at"),
            Some(&PredicateRole::Other)
        );
    }
}

mod boundary_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zero_scans_zero_proposals() {
        let parsed = parse("SELECT * FROM t WHERE k = 1");
        let provider = MapCatalog::new().provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        assert!(recommender.recommend(&parsed, &[], &metrics(10.0)).is_empty());
    }

    #[test]
    fn test_scan_without_candidates_is_skipped() {
        let parsed = parse("SELECT * FROM t WHERE k = 1");
        let provider = MapCatalog::new().provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("unrelated", 1_000, 0, 50.0)];
        assert!(recommender
            .recommend(&parsed, &scans, &metrics(50.0))
            .is_empty());
    }

    #[test]
    fn test_single_distinct_value_never_proposed() {
        let parsed = parse("SELECT * FROM t WHERE flag = true");
        let provider = MapCatalog::new()
            .with_column("t", "flag", 1, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 0, 0, 10_000.0)];
        assert!(recommender
            .recommend(&parsed, &scans, &metrics(10_000.0))
            .is_empty());
    }

    #[test]
    fn test_statistics_failure_downgrades_without_aborting() {
        let parsed = parse("SELECT * FROM t WHERE k = 1 AND j > 0");
        let provider = MapCatalog::new()
            .with_failing("t", "k")
            .with_column("t", "j", 100, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 10_000, 9_000, 500.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(500.0));

        assert_eq!(proposals.len(), 1);
        // k lost its equality role, so the range column leads and no
        // partial predicate is extracted
        assert_eq!(proposals[0].columns, vec!["j", "k"]);
        assert_eq!(proposals[0].filter_predicate, None);
        assert_eq!(proposals[0].roles.get("k"), Some(&PredicateRole::Other));
    }

    #[test]
    fn test_improvement_stays_within_bounds() {
        let parsed = parse("SELECT * FROM t WHERE k = 1 AND j > 0 ORDER BY m");
        let provider = MapCatalog::new()
            .with_column("t", "k", 1_000_000, 0.0, 0.9, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        for removed in [0u64, 500_000, 999_999] {
            let scans = [scan("t", 1_000_000, removed, 10_000.0)];
            for proposal in recommender.recommend(&parsed, &scans, &metrics(10_000.0)) {
                assert!((0.0..=0.98).contains(&proposal.improvement));
            }
        }
    }
}

mod option_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_disabled_keeps_equality_columns_indexed() {
        let parsed = parse("SELECT * FROM t WHERE k1 = 3 AND k2 > 10");
        let provider = MapCatalog::new()
            .with_column("t", "k1", 1_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default().with_partial_enabled(false);
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000_000, 999_500, 30_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(30_000.0));

        assert_eq!(proposals[0].columns, vec!["k1", "k2"]);
        assert_eq!(proposals[0].filter_predicate, None);
    }

    #[test]
    fn test_covering_disabled_skips_includes() {
        let parsed = parse("SELECT a FROM t WHERE k = 7");
        let provider = MapCatalog::new()
            .with_column("t", "k", 100_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default().with_covering_enabled(false);
        let recommender = Recommender::new(&provider, &options);

        let mut s = scan("t", 1_000_000, 999_990, 5_000.0);
        s.output = vec!["t.a".into(), "t.k".into()];
        let proposals = recommender.recommend(&parsed, &[s], &metrics(5_000.0));

        assert!(proposals[0].include_columns.is_empty());
    }

    #[test]
    fn test_wide_projection_skips_covering() {
        let parsed = parse("SELECT * FROM t WHERE k = 7");
        let provider = MapCatalog::new()
            .with_column("t", "k", 100_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let mut s = scan("t", 1_000_000, 999_990, 5_000.0);
        s.output = (0..7).map(|i| format!("t.col{i}")).collect();
        let proposals = recommender.recommend(&parsed, &[s], &metrics(5_000.0));

        assert!(proposals[0].include_columns.is_empty());
    }

    #[test]
    fn test_projected_expressions_skip_covering() {
        let parsed = parse("SELECT * FROM t WHERE k = 7");
        let provider = MapCatalog::new()
            .with_column("t", "k", 100_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let mut s = scan("t", 1_000_000, 999_990, 5_000.0);
        s.output = vec!["lower(t.a)".into(), "t.k".into()];
        let proposals = recommender.recommend(&parsed, &[s], &metrics(5_000.0));

        assert!(proposals[0].include_columns.is_empty());
    }
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_ddl_tokenises_to_the_proposal_identifiers() {
        let parsed = parse("SELECT * FROM t WHERE k1 = 3 AND k2 > 10");
        let provider = MapCatalog::new()
            .with_column("t", "k1", 1_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000_000, 999_500, 30_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(30_000.0));
        let proposal = &proposals[0];

        let ddl = proposal.to_ddl();
        let dialect = sqlparser::dialect::PostgreSqlDialect {};
        let tokens = sqlparser::tokenizer::Tokenizer::new(&dialect, &ddl)
            .tokenize()
            .unwrap();
        let words: Vec<String> = tokens
            .iter()
            .filter_map(|token| match token {
                sqlparser::tokenizer::Token::Word(word) => Some(word.value.clone()),
                _ => None,
            })
            .collect();

        assert!(words.contains(&proposal.table));
        for column in &proposal.columns {
            assert!(words.contains(column));
        }
        // the predicate column appears in the WHERE clause, not the key list
        assert!(words.contains(&"k1".to_string()));
    }

    #[test]
    fn test_partial_predicate_reparses_as_where_clause() {
        let parsed = parse(
            "SELECT o.id FROM orders o WHERE o.status = 'pending' \
             AND o.created_at > '2025-01-01'",
        );
        let provider = MapCatalog::new()
            .with_column("orders", "status", 5, 0.0, 0.1, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("orders", 1_000_000, 999_000, 25_000.0)];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(25_000.0));
        let predicate = proposals[0].filter_predicate.clone().unwrap();

        let reparsed = SqlAnalyser::parse(&format!("SELECT * FROM orders WHERE {predicate}"));
        assert!(reparsed.is_ok());
    }
}

mod ranking_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duplicate_scans_collapse() {
        let parsed = parse("SELECT * FROM t WHERE k = 'v'");
        let provider = MapCatalog::new()
            .with_column("t", "k", 10_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [
            scan("t", 1_000_000, 999_000, 10_000.0),
            scan("t", 1_000_000, 999_000, 10_000.0),
        ];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(20_000.0));
        assert_eq!(proposals.len(), 1);
    }

    #[test]
    fn test_proposals_ranked_by_improvement_descending() {
        let parsed = parse(
            "SELECT * FROM a JOIN b ON a.bid = b.id WHERE a.k = 'v' AND b.coarse > 5",
        );
        let provider = MapCatalog::new()
            .with_column("a", "k", 1_000_000, 0.0, 0.0, 1_000_000)
            .with_column("a", "bid", 1_000, 0.0, 0.0, 1_000_000)
            .with_column("b", "coarse", 4, 0.0, 0.0, 1_000_000)
            .with_column("b", "id", 1_000_000, 0.0, 0.0, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [
            scan("b", 1_000_000, 200_000, 8_000.0),
            scan("a", 1_000_000, 999_999, 9_000.0),
        ];
        let proposals = recommender.recommend(&parsed, &scans, &metrics(17_000.0));

        assert_eq!(proposals.len(), 2);
        assert!(proposals[0].improvement >= proposals[1].improvement);
        assert_eq!(proposals[0].table, "a");
    }

    #[test]
    fn test_repeated_passes_are_identical() {
        let parsed = parse("SELECT * FROM t WHERE k = 'v' AND j > 0 ORDER BY m");
        let provider = MapCatalog::new()
            .with_column("t", "k", 10_000, 0.0, 0.2, 1_000_000)
            .with_column("t", "j", 500, 0.0, -0.4, 1_000_000)
            .provider();
        let options = AdvisorOptions::default();
        let recommender = Recommender::new(&provider, &options);

        let scans = [scan("t", 1_000_000, 990_000, 12_000.0)];
        let first = recommender.recommend(&parsed, &scans, &metrics(12_000.0));
        let second = recommender.recommend(&parsed, &scans, &metrics(12_000.0));
        assert_eq!(first, second);
    }
}
