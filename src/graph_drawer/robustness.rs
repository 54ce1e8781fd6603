//! Leave-one-out searches for the report that distorts a drawing most.
//!
//! Each candidate reruns the weighted pipeline on its own copy of the table
//! with one neighbor (or one reciprocal link) removed, and is scored by how far
//! the caller's distances move relative to the baseline.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::entry_table::{EntryTable, NodeId};
use crate::error::{ResolveError, Result};
use crate::graph_drawer::{resolve_distances_weighted, WeightedResolution, MIN_NEIGHBORS};

/// Largest neighborhood for which the quadratic link search is attempted.
pub const MAX_LINK_SEARCH_NEIGHBORS: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct NeighborDrop {
    pub distances: HashMap<NodeId, f64>,
    /// `None` when no candidate rerun succeeded; distances are then the baseline.
    pub worst_neighbor: Option<NodeId>,
    /// Score per neighbor, ascending by id. Failed candidates are absent.
    pub scores: Vec<(NodeId, f64)>,
    pub average_stress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkDrop {
    pub distances: HashMap<NodeId, f64>,
    pub worst_link: Option<(NodeId, NodeId)>,
    pub scores: Vec<((NodeId, NodeId), f64)>,
    pub average_stress: f64,
}

/// `Σ |a_n − b_n| / ((a_n + b_n) / 2)` over neighbors present in both maps.
///
/// Pairs where both distances are 0 contribute nothing.
pub fn relative_delta(baseline: &HashMap<NodeId, f64>, other: &HashMap<NodeId, f64>) -> f64 {
    baseline
        .iter()
        .filter_map(|(id, &a)| other.get(id).map(|&b| (a, b)))
        .map(|(a, b)| {
            let mean = 0.5 * (a + b);
            if mean > 0.0 {
                (a - b).abs() / mean
            } else {
                0.0
            }
        })
        .sum()
}

/// The caller's neighbors after sanitization; errors when there is nothing to drop.
fn droppable_neighbors(caller: NodeId, table: &EntryTable) -> Result<Vec<NodeId>> {
    let mut sanitized = table.deep_copy();
    sanitized.sanitize();
    let neighbors = sanitized.neighbors_of(caller);
    if neighbors.len() < MIN_NEIGHBORS {
        return Err(ResolveError::invalid_input(format!(
            "leave-one-out needs at least {MIN_NEIGHBORS} neighbors (caller {caller} has {})",
            neighbors.len()
        )));
    }
    Ok(neighbors)
}

/// Highest-scoring candidate; ties go to the first in candidate order.
fn pick_worst<K: Copy>(scored: &[(K, f64, WeightedResolution)]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (_, score, _)) in scored.iter().enumerate() {
        if best.map_or(true, |(_, s)| *score > s) {
            best = Some((i, *score));
        }
    }
    best.map(|(i, _)| i)
}

/// Drop each direct neighbor in turn and keep the drawing without the one
/// whose removal moves the caller's distances most.
///
/// The dropped neighbor's distance is restored to the caller's raw estimate.
pub fn resolve_distances_drop_worst_neighbor(
    caller: NodeId,
    table: &EntryTable,
    cfg: &Config,
) -> Result<NeighborDrop> {
    let neighbors = droppable_neighbors(caller, table)?;
    let base = resolve_distances_weighted(caller, table, cfg)?;

    let mut scored: Vec<(NodeId, f64, WeightedResolution)> = neighbors
        .par_iter()
        .filter_map(|&k| {
            let candidate = table.without_node(k);
            match resolve_distances_weighted(caller, &candidate, cfg) {
                Ok(r) => Some((k, relative_delta(&base.distances, &r.distances), r)),
                Err(err) => {
                    warn!(caller, dropped = k, code = err.code(), error = %err, "drop candidate failed");
                    None
                }
            }
        })
        .collect();
    scored.sort_by_key(|(k, _, _)| *k);

    let scores = scored.iter().map(|(k, s, _)| (*k, *s)).collect();
    let Some(worst) = pick_worst(&scored) else {
        warn!(caller, "no drop candidate resolved; keeping baseline");
        return Ok(NeighborDrop {
            distances: base.distances,
            worst_neighbor: None,
            scores,
            average_stress: base.average_stress,
        });
    };

    let (worst_id, worst_score, result) = scored.swap_remove(worst);
    let mut distances = result.distances;
    if let Some(raw) = table.get(caller, worst_id) {
        distances.insert(worst_id, raw);
    }
    debug!(caller, worst_neighbor = worst_id, score = worst_score, "dropped worst neighbor");

    Ok(NeighborDrop {
        distances,
        worst_neighbor: Some(worst_id),
        scores,
        average_stress: result.average_stress,
    })
}

/// Drop each reciprocal link between two direct neighbors in turn and keep
/// the drawing without the most distorting one.
pub fn resolve_distances_drop_worst_link(
    caller: NodeId,
    table: &EntryTable,
    cfg: &Config,
) -> Result<LinkDrop> {
    let neighbors = droppable_neighbors(caller, table)?;
    if neighbors.len() > MAX_LINK_SEARCH_NEIGHBORS {
        return Err(ResolveError::invalid_input(format!(
            "{} neighbors exceeds the link search limit ({MAX_LINK_SEARCH_NEIGHBORS})",
            neighbors.len()
        )));
    }
    let base = resolve_distances_weighted(caller, table, cfg)?;

    let mut pairs = Vec::new();
    for (i, &a) in neighbors.iter().enumerate() {
        for &b in &neighbors[i + 1..] {
            pairs.push((a, b));
        }
    }

    let mut scored: Vec<((NodeId, NodeId), f64, WeightedResolution)> = pairs
        .par_iter()
        .filter_map(|&(a, b)| {
            let (candidate, changed) = table.without_link(a, b);
            if !changed {
                return None;
            }
            match resolve_distances_weighted(caller, &candidate, cfg) {
                Ok(r) => Some(((a, b), relative_delta(&base.distances, &r.distances), r)),
                Err(err) => {
                    warn!(caller, link = ?(a, b), code = err.code(), error = %err, "drop candidate failed");
                    None
                }
            }
        })
        .collect();
    scored.sort_by_key(|(link, _, _)| *link);

    let scores = scored.iter().map(|(link, s, _)| (*link, *s)).collect();
    let Some(worst) = pick_worst(&scored) else {
        debug!(caller, "no link between neighbors to drop; keeping baseline");
        return Ok(LinkDrop {
            distances: base.distances,
            worst_link: None,
            scores,
            average_stress: base.average_stress,
        });
    };

    let (worst_link, worst_score, result) = scored.swap_remove(worst);
    debug!(caller, link = ?worst_link, score = worst_score, "dropped worst link");

    Ok(LinkDrop {
        distances: result.distances,
        worst_link: Some(worst_link),
        scores,
        average_stress: result.average_stress,
    })
}
