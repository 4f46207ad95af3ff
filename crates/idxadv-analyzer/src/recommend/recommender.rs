//! The recommendation pipeline
//!
//! For every full-table scan: gather the candidate columns the statement
//! actually constrains, price them with catalog statistics, order them for
//! a composite index, peel constant-equality columns into a partial-index
//! predicate, add covering columns when the projection allows it, and
//! attach an over-indexing warning when the table is already index-heavy.
//! Proposals are deduplicated across scans and ranked by predicted
//! improvement.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use idxadv_core::{AdvisorOptions, ParsedQuery, PlanMetrics, PredicateRole, ScanRecord};
use idxadv_gateway::StatsProvider;

use super::proposal::Proposal;
use super::selectivity::{self, COVERING_BOOST, DEFAULT_SELECTIVITY, IMPROVEMENT_CAP};

/// Upper bound on covered columns; wider sets bloat the index
pub const MAX_INCLUDE_COLUMNS: usize = 5;

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    role: PredicateRole,
    /// Referenced only in ORDER BY, never constrained
    order_only: bool,
    base: f64,
    correlation: f64,
}

/// Fuses parser output, scan records and statistics into proposals
pub struct Recommender<'a> {
    stats: &'a StatsProvider,
    options: &'a AdvisorOptions,
}

impl<'a> Recommender<'a> {
    pub fn new(stats: &'a StatsProvider, options: &'a AdvisorOptions) -> Self {
        Self { stats, options }
    }

    /// One pass over every scan record. May return an empty list.
    pub fn recommend(
        &self,
        parsed: &ParsedQuery,
        scans: &[ScanRecord],
        metrics: &PlanMetrics,
    ) -> Vec<Proposal> {
        let mut proposals = Vec::new();
        for scan in scans {
            if let Some(proposal) = self.propose_for_scan(parsed, scan, metrics) {
                proposals.push(proposal);
            }
        }
        dedup_and_rank(proposals)
    }

    fn propose_for_scan(
        &self,
        parsed: &ParsedQuery,
        scan: &ScanRecord,
        metrics: &PlanMetrics,
    ) -> Option<Proposal> {
        let ordered = order_candidates(self.gather_candidates(parsed, scan));
        if ordered.is_empty() {
            tracing::trace!(table = %scan.table, "no candidate columns for scan");
            return None;
        }
        let leading_correlation = ordered[0].correlation;

        let (indexed, predicate_cols) = self.split_partial(&ordered, parsed);

        let min_indexed = indexed
            .iter()
            .map(|c| c.base)
            .fold(f64::INFINITY, f64::min);
        // A partial predicate narrows the indexed domain, so the extracted
        // equality selectivities multiply in.
        let predicate_product: f64 = predicate_cols
            .iter()
            .filter(|(name, _, _)| !indexed.iter().any(|c| &c.name == name))
            .map(|(_, _, base)| *base)
            .product();
        let composite = min_indexed * predicate_product;
        let final_selectivity = selectivity::blend(composite, scan.observed_selectivity());
        if final_selectivity >= 1.0 {
            // every row matches; an index cannot help
            return None;
        }

        let mut improvement = selectivity::improvement(final_selectivity, leading_correlation);

        let filter_predicate = (!predicate_cols.is_empty()).then(|| {
            predicate_cols
                .iter()
                .map(|(name, literal, _)| format!("{name} = {literal}"))
                .collect::<Vec<_>>()
                .join(" AND ")
        });

        let columns: Vec<String> = indexed.iter().map(|c| c.name.clone()).collect();
        let include_columns = if self.options.covering_enabled {
            covering_columns(scan, &columns)
        } else {
            Vec::new()
        };
        if !include_columns.is_empty() {
            improvement = (improvement * COVERING_BOOST).min(IMPROVEMENT_CAP);
        }

        let mut roles = BTreeMap::new();
        for (position, candidate) in indexed.iter().enumerate() {
            let role = if candidate.order_only {
                if position == 0 {
                    PredicateRole::Other
                } else {
                    PredicateRole::OrderBy
                }
            } else {
                candidate.role
            };
            roles.insert(candidate.name.clone(), role);
        }
        for (name, _, _) in &predicate_cols {
            roles.insert(name.clone(), PredicateRole::Equality);
        }

        let plan_cost = metrics.total_cost.max(scan.total_cost);
        let mut rationale = format!(
            "sequential scan on {} reads {} rows at cost {:.1} of {:.1}; estimated selectivity {:.4}",
            scan.table, scan.rows_scanned, scan.total_cost, plan_cost, final_selectivity
        );
        if filter_predicate.is_some() {
            rationale.push_str("; constant equality filter becomes a partial-index predicate");
        }
        if !include_columns.is_empty() {
            rationale.push_str("; includes cover the scan's projection");
        }

        Some(Proposal {
            table: scan.table.clone(),
            columns,
            filter_predicate,
            include_columns,
            roles,
            improvement,
            rationale,
            warning: self.over_indexing_warning(&scan.table),
        })
    }

    /// Candidate columns for a scan: where/join columns qualified to the
    /// scanned table, plus its order-by columns. Ambiguous columns never
    /// reach this point because they have no qualifying-table entry.
    fn gather_candidates(&self, parsed: &ParsedQuery, scan: &ScanRecord) -> Vec<Candidate> {
        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for name in parsed.where_columns.iter().chain(parsed.join_columns.iter()) {
            if parsed.column_tables.get(name) == Some(&scan.table) && seen.insert(name.clone()) {
                candidates.push(self.candidate(&scan.table, name.clone(), parsed.role_of(name), false));
            }
        }
        for name in parsed.order_by_columns.iter() {
            if parsed.column_tables.get(name) == Some(&scan.table) && seen.insert(name.clone()) {
                candidates.push(self.candidate(
                    &scan.table,
                    name.clone(),
                    PredicateRole::Other,
                    true,
                ));
            }
        }
        candidates
    }

    /// Price one candidate. A statistics failure downgrades the column
    /// instead of aborting the pass.
    fn candidate(
        &self,
        table: &str,
        name: String,
        role: PredicateRole,
        order_only: bool,
    ) -> Candidate {
        match self.stats.column_stats(table, &name) {
            Ok(stats) => {
                let base = selectivity::base_selectivity(role, &stats);
                Candidate {
                    name,
                    role,
                    order_only,
                    base,
                    correlation: stats.correlation,
                }
            }
            Err(e) => {
                tracing::warn!(table, column = %name, error = %e, "statistics unavailable, downgrading column");
                Candidate {
                    name,
                    role: PredicateRole::Other,
                    order_only,
                    base: DEFAULT_SELECTIVITY,
                    correlation: 0.0,
                }
            }
        }
    }

    /// Peel equality-against-literal columns into the partial predicate.
    ///
    /// Returns the indexed candidates and `(column, literal, base)` for
    /// every predicate conjunct. When extraction would leave nothing to
    /// index, a sole extracted column is indexed plainly instead, and with
    /// several extracted columns the most selective one moves back to lead
    /// the index while its conjunct leaves the predicate.
    fn split_partial(
        &self,
        ordered: &[Candidate],
        parsed: &ParsedQuery,
    ) -> (Vec<Candidate>, Vec<(String, String, f64)>) {
        if !self.options.partial_enabled {
            return (ordered.to_vec(), Vec::new());
        }
        let mut indexed = Vec::new();
        let mut extracted: Vec<(Candidate, String)> = Vec::new();
        for candidate in ordered {
            if !candidate.order_only && candidate.role == PredicateRole::Equality {
                if let Some(literal) = parsed.constants.get(&candidate.name) {
                    extracted.push((candidate.clone(), literal.clone()));
                    continue;
                }
            }
            indexed.push(candidate.clone());
        }
        if indexed.is_empty() && !extracted.is_empty() {
            // A predicate-only proposal would index nothing. The equality
            // partition is sorted most-selective first, so the head moves
            // back to lead the index; its conjunct leaves the predicate.
            let (candidate, _) = extracted.remove(0);
            indexed.push(candidate);
        }
        let predicate_cols = extracted
            .into_iter()
            .map(|(candidate, literal)| (candidate.name, literal, candidate.base))
            .collect();
        (indexed, predicate_cols)
    }

    /// Warn about over-indexing; the proposal is never suppressed.
    fn over_indexing_warning(&self, table: &str) -> Option<String> {
        let health = match self.stats.table_health(table) {
            Ok(health) => health,
            Err(e) => {
                tracing::warn!(table, error = %e, "table health unavailable, skipping warning check");
                return None;
            }
        };
        let mut parts = Vec::new();
        if health.existing_index_count >= 5 {
            parts.push(format!(
                "table {table} already has {} indexes; another one adds write overhead",
                health.existing_index_count
            ));
        }
        let maintenance = health.existing_index_count as f64 * 0.15 * health.write_ratio;
        if health.write_ratio > 0.5 && maintenance > 0.3 {
            parts.push(format!(
                "table {table} is write-heavy ({:.0}% writes) and index maintenance is already costly",
                health.write_ratio * 100.0
            ));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

/// Equality first, then range, then other; ascending base selectivity
/// within each partition; order-by-only columns appended last.
fn order_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut equality = Vec::new();
    let mut range = Vec::new();
    let mut other = Vec::new();
    let mut order_only = Vec::new();
    for candidate in candidates {
        if candidate.order_only {
            order_only.push(candidate);
        } else {
            match candidate.role {
                PredicateRole::Equality => equality.push(candidate),
                PredicateRole::Range => range.push(candidate),
                _ => other.push(candidate),
            }
        }
    }
    equality.sort_by(|a, b| a.base.total_cmp(&b.base));
    range.sort_by(|a, b| a.base.total_cmp(&b.base));
    other.sort_by(|a, b| a.base.total_cmp(&b.base));

    let mut ordered = equality;
    ordered.extend(range);
    ordered.extend(other);
    ordered.extend(order_only);
    ordered
}

/// Covered columns for a scan: its projected output minus the indexed
/// columns, accepted only when the projection is a short list of plain
/// column references.
fn covering_columns(scan: &ScanRecord, indexed: &[String]) -> Vec<String> {
    if scan.output.is_empty() || scan.output.len() > MAX_INCLUDE_COLUMNS {
        return Vec::new();
    }
    let mut include = Vec::new();
    for entry in &scan.output {
        let bare = entry.rsplit('.').next().unwrap_or(entry);
        if !is_plain_identifier(bare) {
            // projection contains an expression; do not guess
            return Vec::new();
        }
        if indexed.iter().any(|c| c == bare) || include.iter().any(|c| c == bare) {
            continue;
        }
        include.push(bare.to_string());
    }
    include
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Collapse duplicates by (table, columns, predicate, includes), keeping
/// the higher improvement, then rank descending. The sort is stable, so
/// equal keys keep their discovery order.
fn dedup_and_rank(proposals: Vec<Proposal>) -> Vec<Proposal> {
    let mut seen: HashMap<(String, String, String, String), usize> = HashMap::new();
    let mut unique: Vec<Proposal> = Vec::new();
    for proposal in proposals {
        let key = proposal.dedup_key();
        match seen.get(&key) {
            Some(&index) => {
                if proposal.improvement > unique[index].improvement {
                    unique[index] = proposal;
                }
            }
            None => {
                seen.insert(key, unique.len());
                unique.push(proposal);
            }
        }
    }
    unique.sort_by(|a, b| b.improvement.total_cmp(&a.improvement));
    unique
}

#[cfg(test)]
mod tests;
