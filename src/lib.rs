#![forbid(unsafe_code)]

//! # ranging-mds
//!
//! Refine noisy, one-sided proximity estimates by drawing the neighborhood.
//!
//! Each node reports how far it believes it is from the nodes it can sense.
//! Those reports are sparse, disagree with each other, and may be adversarial.
//! For one caller, this crate assembles its neighborhood's reports into a
//! distance matrix, fills the gaps from triangle bounds, embeds the result
//! in the plane with classical MDS, and relaxes the embedding with
//! confidence-weighted stress majorization. The caller's distances to its
//! neighbors are read back off the drawing.
//!
//! Leave-one-out variants look for the single neighbor or link whose reports
//! distort the drawing most and discard it. A synthetic swarm harness
//! ([`swarm`], [`evaluation`]) measures how each method fares against honest
//! noise and a few adversarial reporting strategies.

pub mod config;
pub mod entry_table;
pub mod error;
pub mod evaluation;
pub mod graph_drawer;
pub mod swarm;

pub use config::{Config, MdsScaling, StressGatePolicy};
pub use entry_table::{CanonicalIndex, EntryTable, NodeId, Row};
pub use error::{ResolveError, Result, Stage};
pub use graph_drawer::{
    resolve_distances, resolve_distances_drop_worst_link, resolve_distances_drop_worst_neighbor,
    resolve_distances_weighted, resolve_or_fallback, GateOutcome, LinkDrop, NeighborDrop, Pipeline,
    Resolution, WeightedResolution,
};
