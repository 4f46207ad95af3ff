//! The emitted proposal and its DDL rendering

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use idxadv_core::PredicateRole;

/// Identifier length the target platform will accept without truncating
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// One proposed secondary index
///
/// `columns` is non-empty and duplicate-free; `include_columns` is
/// disjoint from it; a column named in `filter_predicate` never appears
/// in `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub table: String,
    /// Indexed columns in composite order
    pub columns: Vec<String>,
    /// Conjunctive predicate for a partial index
    pub filter_predicate: Option<String>,
    /// Non-key columns carried for covering
    pub include_columns: Vec<String>,
    /// Role of every candidate column that fed this proposal
    pub roles: BTreeMap<String, PredicateRole>,
    /// Predicted fractional cost reduction, in [0, 0.98]
    pub improvement: f64,
    pub rationale: String,
    pub warning: Option<String>,
}

impl Proposal {
    /// Deterministic index name, truncated to the platform limit with the
    /// `_partial` / `_covering` suffixes preserved.
    pub fn index_name(&self) -> String {
        let mut suffix = String::new();
        if self.filter_predicate.is_some() {
            suffix.push_str("_partial");
        }
        if !self.include_columns.is_empty() {
            suffix.push_str("_covering");
        }
        let mut name = format!("idx_{}_{}", self.table, self.columns.join("_"));
        let budget = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
        if name.len() > budget {
            name.truncate(budget);
            while name.ends_with('_') {
                name.pop();
            }
        }
        name.push_str(&suffix);
        name
    }

    /// Render the canonical data-definition statement.
    pub fn to_ddl(&self) -> String {
        let mut ddl = format!(
            "CREATE INDEX {} ON {} ({})",
            self.index_name(),
            self.table,
            self.columns.join(", ")
        );
        if !self.include_columns.is_empty() {
            ddl.push_str(&format!(" INCLUDE ({})", self.include_columns.join(", ")));
        }
        if let Some(predicate) = &self.filter_predicate {
            ddl.push_str(&format!(" WHERE {predicate}"));
        }
        ddl.push(';');
        ddl
    }

    /// Key used to collapse duplicates across scans.
    pub fn dedup_key(&self) -> (String, String, String, String) {
        (
            self.table.clone(),
            self.columns.join(","),
            self.filter_predicate.clone().unwrap_or_default(),
            self.include_columns.join(","),
        )
    }
}
