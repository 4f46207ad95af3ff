//! idxadv analyzer - from SQL text to ranked index proposals
//!
//! Three stages live here:
//! - `parser`: structural SQL analysis (tables, aliases, column roles)
//! - `explain`: the typed plan model and the full-table-scan inspector
//! - `recommend`: selectivity math, composite ordering, partial/covering
//!   detection and proposal emission
//!
//! `advisor` ties them to the gateway behind the synchronous
//! `IndexAdvisor` facade.

pub mod advisor;
pub mod explain;
pub mod parser;
pub mod recommend;

pub use advisor::{Analysis, CancelHandle, IndexAdvisor};
pub use explain::{NodeCost, NodeType, PlanInspector, PlanNode, QueryPlan};
pub use parser::SqlAnalyser;
pub use recommend::{Proposal, Recommender};
