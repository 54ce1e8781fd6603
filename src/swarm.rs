//! Synthetic swarm of ranging agents.
//!
//! Agents are scattered in a square, see each other within sensing range,
//! report noisy (or adversarial) distance guesses, and then refine those
//! guesses with one of the resolution [`Method`]s. Used by the evaluation
//! harness and the `simulate` command.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::entry_table::{EntryTable, NodeId};
use crate::evaluation::Record;
use crate::graph_drawer::{
    resolve_distances, resolve_distances_drop_worst_link, resolve_distances_drop_worst_neighbor,
    resolve_distances_weighted, resolve_or_fallback, MIN_NEIGHBORS,
};

/// Distance at which an encounter counts as "too close".
pub const THRESHOLD_CUTOFF: f64 = 6.0;
/// How far past the cutoff a threshold-breaking guess lands.
pub const THRESHOLD_FUDGE: f64 = 0.1;
pub const UNDER_GUESS_DISTANCE: f64 = 1.0;
pub const OVER_GUESS_DISTANCE: f64 = 15.0;

/// Weighted resolution needs one more neighbor than the other methods.
const MIN_WEIGHTED_NEIGHBORS: usize = MIN_NEIGHBORS + 1;

/// Group shared by every adversary; they collude with each other.
const ADVERSARY_GROUP: u32 = 1;

// ---------------------------------------------------------------------
//  Behaviour
// ---------------------------------------------------------------------

/// How an agent reports its distance to a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// True distance with uniform percent noise.
    Honest,
    /// Always claims to be close.
    UnderGuess,
    /// Always claims to be far.
    OverGuess,
    /// Mirrors the victim's own guess across the threshold cutoff.
    ThresholdBreak,
}

/// What an agent knows when it guesses its distance to one neighbor.
#[derive(Debug, Clone, Copy)]
pub struct GuessContext {
    pub true_distance: f64,
    /// Maximum relative error of an honest guess (0.1 = ±10%).
    pub noise: f64,
    pub neighbor_behavior: Behavior,
    pub same_group: bool,
    /// The neighbor's own guess of this distance, if it already made one.
    pub neighbor_guess: Option<f64>,
}

impl Behavior {
    pub fn is_honest(&self) -> bool {
        matches!(self, Behavior::Honest)
    }

    pub fn estimate_distance<R: Rng + ?Sized>(&self, ctx: &GuessContext, rng: &mut R) -> f64 {
        match self {
            Behavior::Honest => honest_guess(ctx.true_distance, ctx.noise, rng),
            Behavior::UnderGuess => UNDER_GUESS_DISTANCE,
            Behavior::OverGuess => OVER_GUESS_DISTANCE,
            Behavior::ThresholdBreak => {
                if !ctx.neighbor_behavior.is_honest() {
                    if ctx.same_group {
                        0.0
                    } else {
                        honest_guess(ctx.true_distance, ctx.noise, rng)
                    }
                } else {
                    let victim = ctx
                        .neighbor_guess
                        .unwrap_or_else(|| honest_guess(ctx.true_distance, ctx.noise, rng));
                    mirror_across_cutoff(victim)
                }
            }
        }
    }
}

/// Reflect a guess to the other side of [`THRESHOLD_CUTOFF`].
pub fn mirror_across_cutoff(guess: f64) -> f64 {
    if guess <= THRESHOLD_CUTOFF {
        THRESHOLD_CUTOFF + (THRESHOLD_CUTOFF - guess) + THRESHOLD_FUDGE
    } else {
        (THRESHOLD_CUTOFF - (guess - THRESHOLD_CUTOFF) - THRESHOLD_FUDGE).max(0.0)
    }
}

pub fn honest_guess<R: Rng + ?Sized>(true_distance: f64, noise: f64, rng: &mut R) -> f64 {
    if noise <= 0.0 {
        return true_distance;
    }
    let error = rng.gen_range(-noise..=noise);
    (true_distance * (1.0 + error)).max(0.0)
}

impl FromStr for Behavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "honest" => Ok(Behavior::Honest),
            "close" | "under-guess" => Ok(Behavior::UnderGuess),
            "far" | "over-guess" => Ok(Behavior::OverGuess),
            "threshold-break" | "threshold" => Ok(Behavior::ThresholdBreak),
            other => Err(format!(
                "unknown strategy '{other}' (expected honest|close|far|threshold-break)"
            )),
        }
    }
}

// ---------------------------------------------------------------------
//  Methods
// ---------------------------------------------------------------------

/// How an agent turns its initial guesses into final distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    InitialGuess,
    /// Mean of the agent's guess and the neighbor's reciprocal guess.
    AverageOut,
    OneRound,
    Weighted,
    DropNeighbor,
    DropLink,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::InitialGuess,
        Method::AverageOut,
        Method::OneRound,
        Method::Weighted,
        Method::DropNeighbor,
        Method::DropLink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::InitialGuess => "initial_guess",
            Method::AverageOut => "average_out",
            Method::OneRound => "one_round",
            Method::Weighted => "weighted",
            Method::DropNeighbor => "drop_neighbor",
            Method::DropLink => "drop_link",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| format!("unknown method '{s}'"))
    }
}

// ---------------------------------------------------------------------
//  Agents
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    /// Sensing range.
    pub range: f64,
    pub behavior: Behavior,
    pub group: u32,
    pub neighbors: BTreeSet<NodeId>,
    pub initial_guesses: HashMap<NodeId, f64>,
}

impl Agent {
    pub fn new(x: f64, y: f64, range: f64) -> Self {
        Self {
            id: 0,
            x,
            y,
            range,
            behavior: Behavior::Honest,
            group: 0,
            neighbors: BTreeSet::new(),
            initial_guesses: HashMap::new(),
        }
    }

    pub fn distance_to(&self, other: &Agent) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Swarm {
    agents: Vec<Agent>,
}

impl Swarm {
    /// Agents are renumbered so that an agent's id is its position.
    pub fn new(mut agents: Vec<Agent>) -> Self {
        for (i, agent) in agents.iter_mut().enumerate() {
            agent.id = i as NodeId;
        }
        Self { agents }
    }

    /// `n` honest agents placed uniformly in `[0, bounds)²`, all with the same range.
    pub fn random(n: usize, bounds: f64, range: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let agents = (0..n)
            .map(|_| {
                let x = rng.gen_range(0.0..bounds.max(f64::MIN_POSITIVE));
                let y = rng.gen_range(0.0..bounds.max(f64::MIN_POSITIVE));
                Agent::new(x, y, range)
            })
            .collect();
        Self::new(agents)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: NodeId) -> Option<&Agent> {
        self.agents.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn true_distance(&self, a: NodeId, b: NodeId) -> Option<f64> {
        Some(self.agent(a)?.distance_to(self.agent(b)?))
    }

    /// Turn `count` randomly chosen agents into colluding adversaries.
    pub fn make_adversaries<R: Rng + ?Sized>(&mut self, count: usize, behavior: Behavior, rng: &mut R) {
        let count = count.min(self.agents.len());
        for i in sample(rng, self.agents.len(), count) {
            let agent = &mut self.agents[i];
            agent.behavior = behavior;
            agent.group = ADVERSARY_GROUP;
        }
    }

    /// Link every pair closer than their sensing ranges.
    ///
    /// Symmetric: both agents must be in range of each other and both see the
    /// link. Asymmetric: each agent sees whoever is within its own range.
    pub fn connect_within_range(&mut self, symmetric: bool) {
        let n = self.agents.len();
        for agent in &mut self.agents {
            agent.neighbors.clear();
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.agents[i].distance_to(&self.agents[j]);
                let i_sees_j = d < self.agents[i].range;
                let j_sees_i = d < self.agents[j].range;
                let (link_ij, link_ji) = if symmetric {
                    let both = i_sees_j && j_sees_i;
                    (both, both)
                } else {
                    (i_sees_j, j_sees_i)
                };
                if link_ij {
                    self.agents[i].neighbors.insert(j as NodeId);
                }
                if link_ji {
                    self.agents[j].neighbors.insert(i as NodeId);
                }
            }
        }
    }

    /// Remove each neighbor link with probability `rate`.
    ///
    /// Symmetric drops remove the reverse link too.
    pub fn randomly_drop_neighbors<R: Rng + ?Sized>(&mut self, rate: f64, symmetric: bool, rng: &mut R) {
        for i in 0..self.agents.len() {
            let snapshot: Vec<NodeId> = self.agents[i].neighbors.iter().copied().collect();
            for neighbor in snapshot {
                if rng.gen::<f64>() < rate {
                    self.agents[i].neighbors.remove(&neighbor);
                    if symmetric {
                        if let Some(other) = self.agents.get_mut(neighbor as usize) {
                            other.neighbors.remove(&(i as NodeId));
                        }
                    }
                }
            }
        }
    }

    /// Every agent guesses its distance to each neighbor.
    ///
    /// Honest agents go first so threshold breakers can react to their guesses.
    pub fn gather_initial_guesses<R: Rng + ?Sized>(&mut self, noise: f64, rng: &mut R) {
        for agent in &mut self.agents {
            agent.initial_guesses.clear();
        }
        let order: Vec<usize> = (0..self.agents.len())
            .filter(|&i| self.agents[i].behavior.is_honest())
            .chain((0..self.agents.len()).filter(|&i| !self.agents[i].behavior.is_honest()))
            .collect();

        for i in order {
            let neighbors: Vec<NodeId> = self.agents[i].neighbors.iter().copied().collect();
            for neighbor in neighbors {
                let Some(other) = self.agents.get(neighbor as usize) else {
                    continue;
                };
                let me = &self.agents[i];
                let ctx = GuessContext {
                    true_distance: me.distance_to(other),
                    noise,
                    neighbor_behavior: other.behavior,
                    same_group: me.group == other.group,
                    neighbor_guess: other.initial_guesses.get(&me.id).copied(),
                };
                let guess = me.behavior.estimate_distance(&ctx, rng);
                self.agents[i].initial_guesses.insert(neighbor, guess);
            }
        }
    }

    /// The entry table `id` would assemble: its own guesses plus each
    /// neighbor's guesses, copied.
    pub fn entry_table_for(&self, id: NodeId) -> EntryTable {
        let mut table = EntryTable::new();
        let Some(agent) = self.agent(id) else {
            return table;
        };
        table.insert_row(id, agent.initial_guesses.clone());
        for &neighbor in &agent.neighbors {
            if let Some(other) = self.agent(neighbor) {
                table.insert_row(neighbor, other.initial_guesses.clone());
            }
        }
        table
    }

    // -----------------------------------------------------------------
    //  Resolution
    // -----------------------------------------------------------------

    /// Refine every agent's distances with `method` and record the result
    /// for each neighbor. Agents are resolved in parallel.
    pub fn run_method(&self, method: Method, round: usize, cfg: &Config) -> Vec<Record> {
        let records: Vec<Record> = self
            .agents
            .par_iter()
            .flat_map_iter(|agent| {
                let (distances, average_stress) = self.resolve_agent(agent, method, cfg);
                let mut rows = Vec::with_capacity(agent.neighbors.len());
                for &neighbor in &agent.neighbors {
                    let Some(true_distance) = self.true_distance(agent.id, neighbor) else {
                        continue;
                    };
                    let guessed = distances
                        .get(&neighbor)
                        .or_else(|| agent.initial_guesses.get(&neighbor))
                        .copied();
                    let Some(guessed_distance) = guessed else {
                        continue;
                    };
                    rows.push(Record {
                        round,
                        method,
                        agent: agent.id,
                        neighbor,
                        true_distance,
                        guessed_distance,
                        average_stress,
                    });
                }
                rows
            })
            .collect();
        debug!(method = %method, round, records = records.len(), "method applied");
        records
    }

    fn resolve_agent(&self, agent: &Agent, method: Method, cfg: &Config) -> (HashMap<NodeId, f64>, Option<f64>) {
        let initial = || (agent.initial_guesses.clone(), None);
        let degree = agent.neighbors.len();
        let id = agent.id;

        match method {
            Method::InitialGuess => initial(),
            Method::AverageOut => {
                let averaged = agent
                    .initial_guesses
                    .iter()
                    .map(|(&n, &mine)| {
                        let theirs = self
                            .agent(n)
                            .and_then(|other| other.initial_guesses.get(&id))
                            .copied();
                        (n, theirs.map_or(mine, |t| 0.5 * (mine + t)))
                    })
                    .collect();
                (averaged, None)
            }
            Method::OneRound => {
                if degree < MIN_NEIGHBORS {
                    return initial();
                }
                let table = self.entry_table_for(id);
                (resolve_or_fallback(id, &table, |t| resolve_distances(id, t, cfg)), None)
            }
            Method::Weighted => {
                if !agent.behavior.is_honest() || degree < MIN_WEIGHTED_NEIGHBORS {
                    return initial();
                }
                let table = self.entry_table_for(id);
                match resolve_distances_weighted(id, &table, cfg) {
                    Ok(r) => (r.distances, Some(r.average_stress)),
                    Err(err) => {
                        warn!(agent = id, code = err.code(), error = %err, "weighted resolution failed; keeping raw guesses");
                        initial()
                    }
                }
            }
            Method::DropNeighbor => {
                if degree < MIN_NEIGHBORS {
                    return initial();
                }
                let table = self.entry_table_for(id);
                let distances = resolve_or_fallback(id, &table, |t| {
                    resolve_distances_drop_worst_neighbor(id, t, cfg).map(|r| r.distances)
                });
                (distances, None)
            }
            Method::DropLink => {
                if degree < MIN_NEIGHBORS {
                    return initial();
                }
                let table = self.entry_table_for(id);
                let distances = resolve_or_fallback(id, &table, |t| {
                    resolve_distances_drop_worst_link(id, t, cfg).map(|r| r.distances)
                });
                (distances, None)
            }
        }
    }
}
