//! Selectivity and improvement arithmetic
//!
//! Per-column base selectivity follows the planner's own conventions:
//! equality predicates scale with the distinct-value count adjusted for
//! nulls, ranges use the uniform-range default, everything else is a coin
//! flip. Catalog numbers are blended with the selectivity actually
//! observed by the scan when one is available.

use idxadv_core::{ColumnStats, PredicateRole};

/// Uniform-range default selectivity for range predicates
pub const RANGE_SELECTIVITY: f64 = 0.3333;

/// Selectivity assumed for unclassifiable predicates and order-by columns
pub const DEFAULT_SELECTIVITY: f64 = 0.5;

/// Multiplier applied when an index covers the scan's projection
pub const COVERING_BOOST: f64 = 1.15;

/// Hard ceiling on any predicted improvement
pub const IMPROVEMENT_CAP: f64 = 0.98;

const SELECTIVITY_FLOOR: f64 = 1e-9;

/// Weight given to the observed selectivity when blending with catalog
/// estimates.
const OBSERVED_WEIGHT: f64 = 0.6;

/// Base selectivity of one column under the given predicate role.
pub fn base_selectivity(role: PredicateRole, stats: &ColumnStats) -> f64 {
    match role {
        PredicateRole::Equality => {
            (1.0 / stats.distinct_values as f64) * (1.0 - stats.null_frac)
        }
        PredicateRole::Range => RANGE_SELECTIVITY,
        PredicateRole::Other | PredicateRole::OrderBy => DEFAULT_SELECTIVITY,
    }
}

/// Blend the catalog estimate with the scan's observed selectivity.
///
/// The observation wins the larger share: the planner's statistics can be
/// stale, the scan actually happened.
pub fn blend(base: f64, observed: Option<f64>) -> f64 {
    let blended = match observed {
        Some(obs) => OBSERVED_WEIGHT * obs + (1.0 - OBSERVED_WEIGHT) * base,
        None => base,
    };
    blended.clamp(SELECTIVITY_FLOOR, 1.0)
}

/// Predicted fractional cost reduction for a candidate index.
///
/// Piecewise over selectivity, then penalised by the leading column's
/// physical correlation: well-clustered columns already scan efficiently,
/// so an index buys less.
pub fn improvement(selectivity: f64, leading_correlation: f64) -> f64 {
    let base = if selectivity < 0.001 {
        0.98
    } else if selectivity < 0.01 {
        0.95
    } else if selectivity < 0.05 {
        0.85
    } else if selectivity < 0.10 {
        0.70
    } else if selectivity < 0.20 {
        0.50
    } else {
        0.20
    };
    let adjusted = base * (1.0 - 0.15 * leading_correlation.abs());
    adjusted.clamp(0.0, IMPROVEMENT_CAP)
}
