//! Shared data model
//!
//! These types flow between the analyser, the plan inspector, the
//! statistics provider and the recommender. They are plain data: once
//! produced they are never mutated by a downstream component.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a SQL statement by its leading keyword.
///
/// Used by the gateway's safety check before an analysed explain: only
/// `Read` statements may be executed under `EXPLAIN ANALYZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Read,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

impl StatementKind {
    /// Classify a statement by its leading token, skipping comments.
    pub fn classify(sql: &str) -> Self {
        let keyword = leading_keyword(sql);
        match keyword.as_str() {
            "select" | "with" => Self::Read,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "create" | "alter" | "drop" | "truncate" => Self::Ddl,
            _ => Self::Other,
        }
    }

    /// True when the statement is safe to execute under an analysed explain.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Ddl => "ddl",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// First keyword of a statement, lowercased, with leading whitespace and
/// `--` / `/* */` comments skipped.
fn leading_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = match stripped.find('\n') {
                Some(idx) => stripped[idx + 1..].trim_start(),
                None => "",
            };
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = match stripped.find("*/") {
                Some(idx) => stripped[idx + 2..].trim_start(),
                None => "",
            };
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

/// Structural position of a column within a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateRole {
    Equality,
    Range,
    OrderBy,
    Other,
}

impl PredicateRole {
    /// Priority for upgrade-only classification: once a column is marked
    /// equality a later range occurrence does not downgrade it.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Equality => 3,
            Self::Range => 2,
            Self::Other => 1,
            Self::OrderBy => 0,
        }
    }
}

/// Everything the SQL analyser extracts from one statement.
///
/// Column sets hold bare column names; `column_tables` maps each name to
/// its qualifying table where that table could be determined. Columns that
/// could not be disambiguated live in `ambiguous` and are excluded from
/// candidate generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Base tables in order of first appearance, deduplicated
    pub tables: Vec<String>,
    /// alias -> table (unaliased tables map to themselves)
    pub aliases: BTreeMap<String, String>,
    pub where_columns: BTreeSet<String>,
    pub join_columns: BTreeSet<String>,
    pub order_by_columns: BTreeSet<String>,
    /// column -> qualifying table
    pub column_tables: BTreeMap<String, String>,
    /// column -> predicate role (where/join contexts only)
    pub roles: BTreeMap<String, PredicateRole>,
    /// column -> rendered literal for equality-against-literal predicates
    pub constants: BTreeMap<String, String>,
    /// columns that could not be resolved to a single table
    pub ambiguous: BTreeSet<String>,
}

impl ParsedQuery {
    /// Register a base table, keeping first-appearance order.
    pub fn push_table(&mut self, table: &str) {
        if !self.tables.iter().any(|t| t == table) {
            self.tables.push(table.to_string());
        }
    }

    /// Role of a column, defaulting to `Other` when never classified.
    pub fn role_of(&self, column: &str) -> PredicateRole {
        self.roles
            .get(column)
            .copied()
            .unwrap_or(PredicateRole::Other)
    }

    /// True when the statement references no extractable structure at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.where_columns.is_empty()
            && self.join_columns.is_empty()
            && self.order_by_columns.is_empty()
    }
}

/// One full-table-scan node extracted from the planner output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub table: String,
    /// Actual rows when the plan was analysed, planner estimate otherwise
    pub rows_scanned: u64,
    pub rows_removed_by_filter: u64,
    pub total_cost: f64,
    /// Depth of the node in the plan tree, root = 0
    pub depth: usize,
    /// Filter expression attached to the scan, as printed by the planner
    pub filter: Option<String>,
    /// Columns the scan projects, used for covering-index detection
    pub output: Vec<String>,
}

impl ScanRecord {
    /// Observed selectivity of the scan's filter, when the scan saw rows.
    pub fn observed_selectivity(&self) -> Option<f64> {
        if self.rows_scanned == 0 {
            return None;
        }
        let scanned = self.rows_scanned.max(1) as f64;
        Some(1.0 - self.rows_removed_by_filter as f64 / scanned)
    }
}

/// Top-level metrics of an explained plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub total_cost: f64,
    pub actual_rows: Option<u64>,
    pub execution_ms: Option<f64>,
    pub planning_ms: Option<f64>,
}

/// Column-level distribution statistics from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Absolute distinct-value count, always >= 1 and <= row_count
    pub distinct_values: u64,
    /// Fraction of null values, in [0, 1]
    pub null_frac: f64,
    /// Physical/logical order correlation, in [-1, 1]
    pub correlation: f64,
    pub row_count: u64,
    /// False when the catalog had no entry and defaults were substituted
    pub has_stats: bool,
}

impl ColumnStats {
    /// Resolve raw catalog numbers into absolute statistics.
    ///
    /// The catalog reports `n_distinct` as a negative fraction of the row
    /// count for columns whose distinct count scales with the table.
    pub fn from_catalog(n_distinct: f64, null_frac: f64, correlation: f64, row_count: i64) -> Self {
        let rows = row_count.max(0) as u64;
        let distinct = if n_distinct < 0.0 {
            (-n_distinct * rows as f64).round() as u64
        } else {
            n_distinct.round() as u64
        };
        Self {
            distinct_values: distinct.clamp(1, rows.max(1)),
            null_frac: null_frac.clamp(0.0, 1.0),
            correlation: correlation.clamp(-1.0, 1.0),
            row_count: rows,
            has_stats: true,
        }
    }

    /// Conservative defaults for columns absent from the catalog.
    pub fn fallback() -> Self {
        Self {
            distinct_values: 100,
            null_frac: 0.0,
            correlation: 0.0,
            row_count: 100_000,
            has_stats: false,
        }
    }
}

/// Per-table indexing health, used by the over-indexing guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHealth {
    pub existing_index_count: u64,
    /// writes / (writes + reads), in [0, 1]
    pub write_ratio: f64,
}

impl TableHealth {
    /// Derive the write ratio from raw activity counters.
    ///
    /// Tables with no recorded activity get the historical default of 0.3.
    pub fn from_counters(index_count: i64, writes: i64, reads: i64) -> Self {
        let total = writes + reads;
        let write_ratio = if total > 0 {
            writes as f64 / total as f64
        } else {
            0.3
        };
        Self {
            existing_index_count: index_count.max(0) as u64,
            write_ratio,
        }
    }
}
