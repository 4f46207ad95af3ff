//! Typed query plan model

use serde::{Deserialize, Serialize};

/// Operation performed by a plan node
///
/// Closed enumeration; planner node types without an advisor-relevant
/// meaning collapse to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    SeqScan,
    IndexScan,
    IndexOnlyScan,
    BitmapIndexScan,
    BitmapHeapScan,
    CteScan,
    SubqueryScan,
    FunctionScan,
    ValuesScan,
    NestedLoop,
    HashJoin,
    MergeJoin,
    Sort,
    IncrementalSort,
    Aggregate,
    GroupAggregate,
    HashAggregate,
    WindowAgg,
    Hash,
    Materialize,
    Memoize,
    Limit,
    Unique,
    Append,
    MergeAppend,
    Gather,
    GatherMerge,
    ModifyTable,
    Result,
    Unknown,
}

impl NodeType {
    /// Map the planner's node-type string.
    pub fn from_planner_str(s: &str) -> Self {
        match s {
            "Seq Scan" => Self::SeqScan,
            "Index Scan" => Self::IndexScan,
            "Index Only Scan" => Self::IndexOnlyScan,
            "Bitmap Index Scan" => Self::BitmapIndexScan,
            "Bitmap Heap Scan" => Self::BitmapHeapScan,
            "CTE Scan" => Self::CteScan,
            "Subquery Scan" => Self::SubqueryScan,
            "Function Scan" => Self::FunctionScan,
            "Values Scan" => Self::ValuesScan,
            "Nested Loop" => Self::NestedLoop,
            "Hash Join" => Self::HashJoin,
            "Merge Join" => Self::MergeJoin,
            "Sort" => Self::Sort,
            "Incremental Sort" => Self::IncrementalSort,
            "Aggregate" => Self::Aggregate,
            "GroupAggregate" | "Group Aggregate" => Self::GroupAggregate,
            "HashAggregate" | "Hash Aggregate" => Self::HashAggregate,
            "WindowAgg" | "Window Aggregate" => Self::WindowAgg,
            "Hash" => Self::Hash,
            "Materialize" => Self::Materialize,
            "Memoize" => Self::Memoize,
            "Limit" => Self::Limit,
            "Unique" => Self::Unique,
            "Append" => Self::Append,
            "Merge Append" | "MergeAppend" => Self::MergeAppend,
            "Gather" => Self::Gather,
            "Gather Merge" => Self::GatherMerge,
            "ModifyTable" | "Modify Table" => Self::ModifyTable,
            "Result" => Self::Result,
            _ => Self::Unknown,
        }
    }

    /// True for the full-table-scan variant the recommender cares about.
    pub fn is_sequential_scan(&self) -> bool {
        matches!(self, Self::SeqScan)
    }
}

/// Startup and total cost of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeCost {
    pub startup: f64,
    pub total: f64,
}

impl NodeCost {
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }
}

/// One node of the explained plan tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub node_type: NodeType,
    pub relation: Option<String>,
    pub alias: Option<String>,
    pub cost: Option<NodeCost>,
    /// Planner's row estimate
    pub plan_rows: Option<u64>,
    /// Observed rows, present only for analysed plans
    pub actual_rows: Option<u64>,
    pub rows_removed_by_filter: Option<u64>,
    pub filter: Option<String>,
    /// Projected columns, when the planner exposes them
    pub output: Vec<String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            relation: None,
            alias: None,
            cost: None,
            plan_rows: None,
            actual_rows: None,
            rows_removed_by_filter: None,
            filter: None,
            output: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_cost(mut self, startup: f64, total: f64) -> Self {
        self.cost = Some(NodeCost::new(startup, total));
        self
    }

    pub fn with_plan_rows(mut self, rows: u64) -> Self {
        self.plan_rows = Some(rows);
        self
    }

    pub fn with_actual_rows(mut self, rows: u64) -> Self {
        self.actual_rows = Some(rows);
        self
    }

    pub fn with_rows_removed(mut self, rows: u64) -> Self {
        self.rows_removed_by_filter = Some(rows);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.output = output;
        self
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// Nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// A complete explained plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub root: PlanNode,
    pub planning_ms: Option<f64>,
    pub execution_ms: Option<f64>,
}

impl QueryPlan {
    pub fn new(root: PlanNode) -> Self {
        Self {
            root,
            planning_ms: None,
            execution_ms: None,
        }
    }

    pub fn with_execution_ms(mut self, ms: f64) -> Self {
        self.execution_ms = Some(ms);
        self
    }
}
