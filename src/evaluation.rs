//! Offline evaluation harness for the resolution methods.
//!
//! Builds random swarms, applies every requested [`Method`] to the same
//! guesses, and summarizes how far the refined distances land from the truth.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::info;

use crate::config::Config;
use crate::entry_table::NodeId;
use crate::error::{ResolveError, Result};
use crate::swarm::{Behavior, Method, Swarm, THRESHOLD_CUTOFF};

/// Cutoffs at which the detection cost is reported.
pub const NDCF_CUTOFFS: [f64; 3] = [3.0, 6.0, 10.0];

/// Percentiles reported for the absolute error.
pub const ERROR_QUANTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

// =============================================================================
// Records and summaries
// =============================================================================

/// One agent's refined distance to one neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub round: usize,
    pub method: Method,
    pub agent: NodeId,
    pub neighbor: NodeId,
    pub true_distance: f64,
    pub guessed_distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_stress: Option<f64>,
}

impl Record {
    pub fn error(&self) -> f64 {
        self.guessed_distance - self.true_distance
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub method: Method,
    pub records: usize,
    pub mean_error: f64,
    pub error_std: f64,
    pub mean_abs_error: f64,
    pub abs_error_std: f64,
    /// Mean of `|guess - truth| / truth`, over records with a nonzero true distance.
    pub mean_percent_error: f64,
    /// Absolute error at 0, 25, 50, 75 and 100 percent.
    pub abs_error_quantiles: [f64; 5],
    pub ndcf_3: f64,
    pub ndcf_6: f64,
    pub ndcf_10: f64,
    /// Share of records on the same side of the 6-unit cutoff as the truth.
    pub fraction_correct: f64,
    /// Sum of stress values over all records, so records without one count
    /// as 0. `None` when no record carries a stress value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_stress: Option<f64>,
}

/// Miss rate plus false-alarm rate at `cutoff`.
///
/// A miss is a truly close encounter reported as far; a false alarm is a far
/// one reported as close. Both rates are 0 for an empty set.
pub fn ndcf(records: &[&Record], cutoff: f64) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let mut close = 0usize;
    let mut missed = 0usize;
    let mut far = 0usize;
    let mut false_alarms = 0usize;
    for r in records {
        if r.true_distance < cutoff {
            close += 1;
            if r.guessed_distance > cutoff {
                missed += 1;
            }
        }
        if r.true_distance > cutoff {
            far += 1;
            if r.guessed_distance < cutoff {
                false_alarms += 1;
            }
        }
    }
    let p_miss = missed as f64 / close.max(1) as f64;
    let p_fa = false_alarms as f64 / far.max(1) as f64;
    p_miss + p_fa
}

/// Value at `len · p` of the sorted sample, clamped to the last element.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.mean()
    }
}

/// Sample standard deviation; 0 with fewer than two values.
fn std_or_zero(values: &[f64]) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        values.std_dev()
    }
}

pub fn summarize_method(method: Method, records: &[&Record]) -> MethodSummary {
    let errors: Vec<f64> = records.iter().map(|r| r.error()).collect();
    let mut abs_errors: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    abs_errors.sort_by(|a, b| a.total_cmp(b));

    let mut abs_error_quantiles = [0.0; 5];
    for (slot, p) in abs_error_quantiles.iter_mut().zip(ERROR_QUANTILES) {
        *slot = quantile(&abs_errors, p);
    }

    let correct = records
        .iter()
        .filter(|r| (r.guessed_distance <= THRESHOLD_CUTOFF) == (r.true_distance <= THRESHOLD_CUTOFF))
        .count();
    let percent_errors: Vec<f64> = records
        .iter()
        .filter(|r| r.true_distance > 0.0)
        .map(|r| r.error().abs() / r.true_distance)
        .collect();
    let stresses: Vec<f64> = records.iter().filter_map(|r| r.average_stress).collect();

    MethodSummary {
        method,
        records: records.len(),
        mean_error: mean_or_zero(&errors),
        error_std: std_or_zero(&errors),
        mean_abs_error: mean_or_zero(&abs_errors),
        abs_error_std: std_or_zero(&abs_errors),
        mean_percent_error: mean_or_zero(&percent_errors),
        abs_error_quantiles,
        ndcf_3: ndcf(records, NDCF_CUTOFFS[0]),
        ndcf_6: ndcf(records, NDCF_CUTOFFS[1]),
        ndcf_10: ndcf(records, NDCF_CUTOFFS[2]),
        fraction_correct: if records.is_empty() {
            0.0
        } else {
            correct as f64 / records.len() as f64
        },
        average_stress: (!stresses.is_empty())
            .then(|| stresses.iter().sum::<f64>() / records.len() as f64),
    }
}

/// One summary per method present in `records`, in [`Method`] order.
pub fn summarize(records: &[Record]) -> Vec<MethodSummary> {
    let mut grouped: BTreeMap<Method, Vec<&Record>> = BTreeMap::new();
    for r in records {
        grouped.entry(r.method).or_default().push(r);
    }
    grouped
        .into_iter()
        .map(|(method, rs)| summarize_method(method, &rs))
        .collect()
}

// =============================================================================
// Simulation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub agents: usize,
    pub rounds: usize,
    /// Side of the square the agents are placed in.
    pub bounds: f64,
    pub range: f64,
    /// Maximum relative error of honest guesses.
    pub noise: f64,
    pub drop_rate: f64,
    pub symmetric: bool,
    pub adversaries: usize,
    pub strategy: Behavior,
    pub methods: Vec<Method>,
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            agents: 30,
            rounds: 5,
            bounds: 30.0,
            range: 12.0,
            noise: 0.1,
            drop_rate: 0.0,
            symmetric: true,
            adversaries: 0,
            strategy: Behavior::UnderGuess,
            methods: Method::ALL.to_vec(),
            seed: 42,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.agents == 0 || self.rounds == 0 {
            return Err(ResolveError::invalid_input("agents and rounds must be positive"));
        }
        if !(self.bounds > 0.0 && self.range > 0.0) {
            return Err(ResolveError::invalid_input("bounds and range must be positive"));
        }
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(ResolveError::invalid_input("drop_rate must lie in [0, 1]"));
        }
        if !(self.noise >= 0.0 && self.noise.is_finite()) {
            return Err(ResolveError::invalid_input("noise must be a finite, non-negative fraction"));
        }
        if self.adversaries > self.agents {
            return Err(ResolveError::invalid_input("more adversaries than agents"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub settings: SimulationSettings,
    pub summaries: Vec<MethodSummary>,
}

/// Build one swarm for `round`: placement, adversaries, links, drops, guesses.
pub fn build_round(settings: &SimulationSettings, round: usize) -> Swarm {
    let round_seed = settings.seed.wrapping_add(round as u64);
    let mut swarm = Swarm::random(settings.agents, settings.bounds, settings.range, round_seed);
    let mut rng = StdRng::seed_from_u64(round_seed ^ 0x9e37_79b9_7f4a_7c15);
    if settings.adversaries > 0 {
        swarm.make_adversaries(settings.adversaries, settings.strategy, &mut rng);
    }
    swarm.connect_within_range(settings.symmetric);
    if settings.drop_rate > 0.0 {
        swarm.randomly_drop_neighbors(settings.drop_rate, settings.symmetric, &mut rng);
    }
    swarm.gather_initial_guesses(settings.noise, &mut rng);
    swarm
}

pub fn run_simulation(settings: &SimulationSettings, cfg: &Config) -> Result<SimulationReport> {
    settings.validate()?;
    cfg.validate()?;

    let mut records = Vec::new();
    for round in 0..settings.rounds {
        let swarm = build_round(settings, round);
        for &method in &settings.methods {
            records.extend(swarm.run_method(method, round, cfg));
        }
        info!(round, agents = swarm.len(), records = records.len(), "round complete");
    }

    Ok(SimulationReport {
        settings: settings.clone(),
        summaries: summarize(&records),
    })
}
