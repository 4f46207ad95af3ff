//! Plan model and inspector
//!
//! `plan` holds the typed representation of an explained plan tree;
//! `inspector` turns the gateway's raw JSON into that representation and
//! extracts full-table-scan records and top-level metrics from it.

pub mod inspector;
pub mod plan;

pub use inspector::PlanInspector;
pub use plan::{NodeCost, NodeType, PlanNode, QueryPlan};
