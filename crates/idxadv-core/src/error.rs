//! Error taxonomy for the advisor
//!
//! Every error that crosses a component boundary carries enough context to
//! be actionable: the fingerprint of the offending SQL, the stage that
//! failed, and a human-readable reason. Statistics failures are recovered
//! locally by the recommender; connection failures are retried by the
//! gateway; everything else surfaces to the caller.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::StatementKind;

/// Errors produced by the advisor pipeline
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("statement could not be parsed ({fingerprint}): {reason}")]
    UnparseableStatement { fingerprint: String, reason: String },

    #[error("refusing EXPLAIN ANALYZE for {kind} statement ({fingerprint}): analysis would execute it")]
    RefusedMutatingExplain {
        fingerprint: String,
        kind: StatementKind,
    },

    #[error("explain exceeded its {timeout_ms} ms deadline ({fingerprint})")]
    ExplainTimeout { fingerprint: String, timeout_ms: u64 },

    #[error("planner output unusable ({fingerprint}): {reason}")]
    PlanUnparseable { fingerprint: String, reason: String },

    #[error("statistics unavailable for {table}.{column}: {reason}")]
    StatisticsUnavailable {
        table: String,
        column: String,
        reason: String,
    },

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cancelled")]
    Cancelled,
}

impl AdvisorError {
    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnparseableStatement { .. } => "analyser",
            Self::RefusedMutatingExplain { .. } | Self::ExplainTimeout { .. } => "gateway",
            Self::PlanUnparseable { .. } => "inspector",
            Self::StatisticsUnavailable { .. } => "statistics",
            Self::ConnectionFailure(_) => "gateway",
            Self::Configuration(_) => "configuration",
            Self::Cancelled => "advisor",
        }
    }

    /// Transient errors are worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailure(_))
    }
}

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Short stable fingerprint of a SQL statement.
///
/// Whitespace runs are collapsed and case is folded before hashing, so the
/// same statement formatted differently maps to the same fingerprint.
pub fn sql_fingerprint(sql: &str) -> String {
    let normalized: String = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests;
