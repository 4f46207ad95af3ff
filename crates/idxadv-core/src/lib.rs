//! idxadv core - shared model, errors and configuration
//!
//! This crate defines the vocabulary the rest of the advisor speaks:
//! - the data model (parsed queries, scan records, statistics, proposals)
//! - the error taxonomy with SQL fingerprinting
//! - connection and tuning configuration

pub mod config;
pub mod error;
pub mod model;

pub use config::{AdvisorOptions, DbConfig};
pub use error::{sql_fingerprint, AdvisorError, Result};
pub use model::{
    ColumnStats, ParsedQuery, PlanMetrics, PredicateRole, ScanRecord, StatementKind, TableHealth,
};
