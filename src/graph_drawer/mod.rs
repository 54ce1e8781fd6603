//! Graph-drawing resolution of one caller's distances.
//!
//! Pipeline: sanitize a private copy of the entry table, assemble the dense
//! matrix, fill unknown cells from triangle bounds, symmetrize, embed with
//! classical MDS, relax with stress majorization, then read the caller's
//! distances to its direct neighbors back off the embedding.
//!
//! Every entry point takes `&EntryTable` and never mutates it.

pub mod majorization;
pub mod matrix;
pub mod mds;
pub mod robustness;
pub mod weights;

use std::collections::HashMap;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, StressGatePolicy};
use crate::entry_table::{CanonicalIndex, EntryTable, NodeId, Row};
use crate::error::{ResolveError, Result, Stage};

use self::majorization::{majorize_plain, majorize_weighted, MajorizationOutcome};
use self::matrix::{assemble, ensure_finite, fill_gaps, reported_targets, symmetrize};
use self::mds::{classical_mds, row_distance};
use self::weights::{build_weights, reported_mask};

pub use self::robustness::{
    resolve_distances_drop_worst_link, resolve_distances_drop_worst_neighbor, LinkDrop,
    NeighborDrop, MAX_LINK_SEARCH_NEIGHBORS,
};

/// Fewest direct neighbors for which graph drawing is attempted.
pub const MIN_NEIGHBORS: usize = 2;

// ---------------------------------------------------------------------
//  Results
// ---------------------------------------------------------------------

/// What the stress gate decided for a weighted resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Average stress inside the threshold band; graph-drawn distances returned.
    Accepted,
    /// Too few neighbors to draw; raw entries returned unchanged.
    Bypassed,
    /// Stress outside the band; raw entries returned instead.
    Substituted,
    /// Stress outside the band; graph-drawn distances returned anyway.
    Flagged,
}

impl GateOutcome {
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, GateOutcome::Flagged)
    }
}

/// Result of [`resolve_distances_weighted`].
#[derive(Debug, Clone, Serialize)]
pub struct WeightedResolution {
    pub distances: HashMap<NodeId, f64>,
    /// Total stress divided by the caller's neighbor count.
    pub average_stress: f64,
    pub gate: GateOutcome,
    /// SMACOF iterations run (0 when bypassed).
    pub iterations: usize,
    pub converged: bool,
}

// ---------------------------------------------------------------------
//  Shared preparation
// ---------------------------------------------------------------------

/// Sanitized table copy plus the caller's neighbors and raw row.
struct Prepared {
    table: EntryTable,
    neighbors: Vec<NodeId>,
    raw: Row,
}

fn prepare(caller: NodeId, table: &EntryTable, cfg: &Config) -> Result<Prepared> {
    cfg.validate()?;
    if table.is_empty() {
        return Err(ResolveError::invalid_input("entry table is empty"));
    }
    let mut table = table.deep_copy();
    let dropped = table.sanitize();
    if dropped > 0 {
        debug!(caller, dropped, "sanitized unusable reports");
    }
    let raw = table
        .row(caller)
        .cloned()
        .ok_or_else(|| ResolveError::invalid_input(format!("caller {caller} has no entry")))?;
    let neighbors = table.neighbors_of(caller);
    Ok(Prepared {
        table,
        neighbors,
        raw,
    })
}

/// Dense targets for one caller.
///
/// `distances` is the gap-filled, symmetrized matrix that seeds MDS and drives
/// SMACOF. `reported` and `mask` restrict the plain relaxation to pairs that
/// somebody actually reported.
struct Targets {
    index: CanonicalIndex,
    distances: DMatrix<f64>,
    reported: DMatrix<f64>,
    mask: DMatrix<f64>,
    weights: Option<DMatrix<f64>>,
}

fn build_targets(caller: NodeId, prepared: &Prepared, cfg: &Config, weighted: bool) -> Result<Targets> {
    let (index, raw) = assemble(&prepared.table, caller)?;
    let gaps = fill_gaps(&raw, cfg.gap_bias, cfg.relative_disagreement);
    ensure_finite(&gaps.filled, Stage::GapFill)?;

    let weights = if weighted {
        let mut w = build_weights(&gaps.filled, &gaps.deficits, cfg);
        ensure_finite(&w, Stage::Weights)?;
        symmetrize(&mut w);
        Some(w)
    } else {
        None
    };

    let mut distances = gaps.filled;
    symmetrize(&mut distances);
    let reported = reported_targets(&raw, &distances);
    let mask = reported_mask(&raw);
    debug!(caller, n = index.len(), "assembled target matrix");

    Ok(Targets {
        index,
        distances,
        reported,
        mask,
        weights,
    })
}

/// Caller's distance to each direct neighbor, read off the embedding.
pub fn distances_from_embedding(
    embedding: &DMatrix<f64>,
    index: &CanonicalIndex,
    caller: NodeId,
    neighbors: &[NodeId],
) -> Result<HashMap<NodeId, f64>> {
    let from = index
        .index_of(caller)
        .ok_or_else(|| ResolveError::invalid_input(format!("caller {caller} not indexed")))?;
    let mut out = HashMap::with_capacity(neighbors.len());
    for &neighbor in neighbors {
        let to = index.index_of(neighbor).ok_or_else(|| {
            ResolveError::invalid_input(format!("neighbor {neighbor} not indexed"))
        })?;
        let d = row_distance(embedding, from, to);
        if !d.is_finite() {
            return Err(ResolveError::numeric(
                Stage::Extraction,
                format!("distance to {neighbor} is {d}"),
            ));
        }
        out.insert(neighbor, d);
    }
    Ok(out)
}

// ---------------------------------------------------------------------
//  Pipelines
// ---------------------------------------------------------------------

/// Unweighted pipeline: MDS on the gap-filled matrix, then Laplacian
/// majorization against the reported pairs only.
///
/// With fewer than two neighbors the caller's raw entries come back unchanged.
pub fn resolve_distances(caller: NodeId, table: &EntryTable, cfg: &Config) -> Result<HashMap<NodeId, f64>> {
    let prepared = prepare(caller, table, cfg)?;
    if prepared.neighbors.len() < MIN_NEIGHBORS {
        return Ok(prepared.raw);
    }

    let targets = build_targets(caller, &prepared, cfg, false)?;
    let mut embedding = classical_mds(&targets.distances, cfg.mds_scaling)?;
    let outcome = majorize_plain(
        &mut embedding,
        &targets.reported,
        &targets.mask,
        cfg.plain_max_iters,
        cfg.plain_tol,
    )?;
    debug!(
        caller,
        iterations = outcome.iterations,
        stress = outcome.stress,
        "unweighted resolution"
    );

    distances_from_embedding(&embedding, &targets.index, caller, &prepared.neighbors)
}

/// Weighted pipeline: MDS, optional reported-pair warm start, then weighted
/// SMACOF; the result passes through the stress gate.
pub fn resolve_distances_weighted(
    caller: NodeId,
    table: &EntryTable,
    cfg: &Config,
) -> Result<WeightedResolution> {
    let prepared = prepare(caller, table, cfg)?;
    if prepared.neighbors.len() < MIN_NEIGHBORS {
        return Ok(WeightedResolution {
            distances: prepared.raw,
            average_stress: 0.0,
            gate: GateOutcome::Bypassed,
            iterations: 0,
            converged: true,
        });
    }

    let targets = build_targets(caller, &prepared, cfg, true)?;
    let weights = targets
        .weights
        .as_ref()
        .ok_or_else(|| ResolveError::numeric(Stage::Weights, "weights were not built"))?;

    let mut embedding = classical_mds(&targets.distances, cfg.mds_scaling)?;
    if cfg.smacof_warm_start {
        majorize_plain(
            &mut embedding,
            &targets.reported,
            &targets.mask,
            cfg.plain_max_iters,
            cfg.plain_tol,
        )?;
    }
    let outcome: MajorizationOutcome = majorize_weighted(
        &mut embedding,
        &targets.distances,
        weights,
        cfg.smacof_max_iters,
        cfg.smacof_tol,
    )?;

    let average_stress = outcome.stress / prepared.neighbors.len() as f64;
    let drawn = distances_from_embedding(&embedding, &targets.index, caller, &prepared.neighbors)?;

    let (distances, gate) = if cfg.stress_within_thresholds(average_stress) {
        (drawn, GateOutcome::Accepted)
    } else {
        match cfg.stress_gate {
            StressGatePolicy::Substitute => {
                warn!(
                    caller,
                    average_stress, "stress outside thresholds; returning raw entries"
                );
                (prepared.raw, GateOutcome::Substituted)
            }
            StressGatePolicy::Flag => {
                warn!(caller, average_stress, "stress outside thresholds; flagged");
                (drawn, GateOutcome::Flagged)
            }
        }
    };

    debug!(
        caller,
        iterations = outcome.iterations,
        average_stress,
        gate = ?gate,
        "weighted resolution"
    );

    Ok(WeightedResolution {
        distances,
        average_stress,
        gate,
        iterations: outcome.iterations,
        converged: outcome.converged,
    })
}

/// Run `resolve` and fall back to the caller's raw entries if it fails.
///
/// One node's failure never aborts a round: the error is logged and the
/// caller keeps the distances it reported.
pub fn resolve_or_fallback<F>(caller: NodeId, table: &EntryTable, resolve: F) -> HashMap<NodeId, f64>
where
    F: FnOnce(&EntryTable) -> Result<HashMap<NodeId, f64>>,
{
    match resolve(table) {
        Ok(distances) => distances,
        Err(err) => {
            warn!(
                caller,
                code = err.code(),
                error = %err,
                "graph drawing failed; keeping raw guesses"
            );
            table.row(caller).cloned().unwrap_or_default()
        }
    }
}

// ---------------------------------------------------------------------
//  Pipeline selection
// ---------------------------------------------------------------------

/// Which resolution to run for a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Unweighted,
    Weighted,
    DropWorstNeighbor,
    DropWorstLink,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Unweighted => "unweighted",
            Pipeline::Weighted => "weighted",
            Pipeline::DropWorstNeighbor => "drop-neighbor",
            Pipeline::DropWorstLink => "drop-link",
        }
    }

    /// Run this pipeline and flatten the result to a common shape.
    pub fn run(&self, caller: NodeId, table: &EntryTable, cfg: &Config) -> Result<Resolution> {
        match self {
            Pipeline::Unweighted => Ok(Resolution {
                distances: resolve_distances(caller, table, cfg)?,
                average_stress: None,
                gate: None,
                dropped: None,
            }),
            Pipeline::Weighted => {
                let r = resolve_distances_weighted(caller, table, cfg)?;
                Ok(Resolution {
                    distances: r.distances,
                    average_stress: Some(r.average_stress),
                    gate: Some(r.gate),
                    dropped: None,
                })
            }
            Pipeline::DropWorstNeighbor => {
                let r = resolve_distances_drop_worst_neighbor(caller, table, cfg)?;
                Ok(Resolution {
                    distances: r.distances,
                    average_stress: Some(r.average_stress),
                    gate: None,
                    dropped: r.worst_neighbor.map(|n| vec![n]),
                })
            }
            Pipeline::DropWorstLink => {
                let r = resolve_distances_drop_worst_link(caller, table, cfg)?;
                Ok(Resolution {
                    distances: r.distances,
                    average_stress: Some(r.average_stress),
                    gate: None,
                    dropped: r.worst_link.map(|(a, b)| vec![a, b]),
                })
            }
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "unweighted" | "one-round" => Ok(Pipeline::Unweighted),
            "weighted" => Ok(Pipeline::Weighted),
            "drop-neighbor" | "drop-worst-neighbor" => Ok(Pipeline::DropWorstNeighbor),
            "drop-link" | "drop-worst-link" => Ok(Pipeline::DropWorstLink),
            other => Err(format!(
                "unknown pipeline '{other}' (expected unweighted|weighted|drop-neighbor|drop-link)"
            )),
        }
    }
}

/// Common shape of every pipeline's answer.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub distances: HashMap<NodeId, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_stress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateOutcome>,
    /// Neighbor or link removed by a robustness search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<Vec<NodeId>>,
}
