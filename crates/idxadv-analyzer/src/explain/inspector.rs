//! Plan inspection
//!
//! Parses the gateway's `EXPLAIN (FORMAT JSON)` payload into the typed
//! plan, then walks it pre-order collecting every sequential-scan node.
//! Children are walked regardless of the parent's type, so scans below
//! joins, sorts and gathers are all found.

use serde_json::Value;

use idxadv_core::{AdvisorError, PlanMetrics, Result, ScanRecord};

use super::plan::{NodeCost, NodeType, PlanNode, QueryPlan};

/// Walks explained plans and extracts scan records and metrics
pub struct PlanInspector;

impl PlanInspector {
    /// Parse raw explain JSON into the typed plan tree.
    ///
    /// Accepts both the array wrapper the server emits and a bare object.
    pub fn parse(raw: &Value) -> Result<QueryPlan> {
        let entry = if let Some(arr) = raw.as_array() {
            arr.first()
                .ok_or_else(|| plan_error("explain output is an empty array"))?
        } else {
            raw
        };
        let plan_obj = entry
            .get("Plan")
            .ok_or_else(|| plan_error("missing Plan object"))?;
        let root = parse_node(plan_obj)?;
        let mut plan = QueryPlan::new(root);
        plan.planning_ms = entry.get("Planning Time").and_then(Value::as_f64);
        plan.execution_ms = entry.get("Execution Time").and_then(Value::as_f64);
        Ok(plan)
    }

    /// Parse and reduce in one step: top-level metrics plus scan records.
    pub fn inspect(raw: &Value) -> Result<(PlanMetrics, Vec<ScanRecord>)> {
        let plan = Self::parse(raw)?;
        let metrics = Self::metrics(&plan)?;
        let scans = Self::scans(&plan);
        tracing::debug!(
            total_cost = metrics.total_cost,
            scan_count = scans.len(),
            "plan inspected"
        );
        Ok((metrics, scans))
    }

    /// Top-level plan metrics. The root cost is required.
    pub fn metrics(plan: &QueryPlan) -> Result<PlanMetrics> {
        let cost = plan
            .root
            .cost
            .ok_or_else(|| plan_error("root node carries no cost"))?;
        Ok(PlanMetrics {
            total_cost: cost.total,
            actual_rows: plan.root.actual_rows,
            execution_ms: plan.execution_ms,
            planning_ms: plan.planning_ms,
        })
    }

    /// Every sequential-scan node in the tree, pre-order.
    pub fn scans(plan: &QueryPlan) -> Vec<ScanRecord> {
        let mut scans = Vec::new();
        collect_scans(&plan.root, 0, &mut scans);
        scans
    }
}

fn collect_scans(node: &PlanNode, depth: usize, out: &mut Vec<ScanRecord>) {
    if node.node_type.is_sequential_scan() {
        if let Some(table) = &node.relation {
            out.push(ScanRecord {
                table: table.clone(),
                rows_scanned: node.actual_rows.or(node.plan_rows).unwrap_or(0),
                rows_removed_by_filter: node.rows_removed_by_filter.unwrap_or(0),
                total_cost: node.cost.map(|c| c.total).unwrap_or(0.0),
                depth,
                filter: node.filter.clone(),
                output: node.output.clone(),
            });
        }
    }
    for child in &node.children {
        collect_scans(child, depth + 1, out);
    }
}

fn parse_node(value: &Value) -> Result<PlanNode> {
    let node_type = value
        .get("Node Type")
        .and_then(Value::as_str)
        .ok_or_else(|| plan_error("node missing Node Type"))?;
    let mut node = PlanNode::new(NodeType::from_planner_str(node_type));

    node.relation = value
        .get("Relation Name")
        .and_then(Value::as_str)
        .map(String::from);
    node.alias = value.get("Alias").and_then(Value::as_str).map(String::from);

    let startup = value.get("Startup Cost").and_then(Value::as_f64);
    let total = value.get("Total Cost").and_then(Value::as_f64);
    if let (Some(startup), Some(total)) = (startup, total) {
        node.cost = Some(NodeCost::new(startup, total));
    }

    node.plan_rows = value.get("Plan Rows").and_then(Value::as_u64);
    node.actual_rows = value.get("Actual Rows").and_then(Value::as_u64);
    node.rows_removed_by_filter = value.get("Rows Removed by Filter").and_then(Value::as_u64);
    node.filter = value
        .get("Filter")
        .and_then(Value::as_str)
        .map(String::from);
    node.output = value
        .get("Output")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    if let Some(children) = value.get("Plans").and_then(Value::as_array) {
        for child in children {
            node.children.push(parse_node(child)?);
        }
    }
    Ok(node)
}

fn plan_error(reason: &str) -> AdvisorError {
    AdvisorError::PlanUnparseable {
        fingerprint: String::new(),
        reason: reason.to_string(),
    }
}
