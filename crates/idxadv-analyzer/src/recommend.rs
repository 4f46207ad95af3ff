//! Index recommendation
//!
//! `selectivity` holds the cost-model arithmetic, `proposal` the emitted
//! artefact with its DDL rendering, and `recommender` the per-scan
//! pipeline that fuses parser output, scan records and catalog statistics
//! into ranked proposals.

pub mod proposal;
pub mod recommender;
pub mod selectivity;

pub use proposal::Proposal;
pub use recommender::Recommender;
