//! Tuning parameters shared by every resolution.
//!
//! A `Config` is passed by reference to each resolve call and never mutated.

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// How the two dominant eigenvectors are scaled into embedding coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdsScaling {
    /// `v · sqrt(λ)`: recovers exact Euclidean configurations.
    SqrtEigenvalue,
    /// `v / sqrt(λ)`: only meaningful as a majorization seed.
    InverseSqrt,
}

/// What the weighted pipeline does when average stress leaves the threshold band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressGatePolicy {
    /// Return the caller's raw entry-table distances instead of the drawing.
    Substitute,
    /// Keep the drawing but mark the resolution as low confidence.
    Flag,
}

/// Configuration for the resolution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -- Weight builder ------------------------------------------------------
    // pre = baseline + distance * avg(d_ij, d_ji) + disagreement * dis(i, j)
    // w   = pre^-alpha (fractional) or exp(-pre) (exponential)

    /// Exponent for fractional weights.
    pub alpha: f64,
    /// Coefficient on the averaged direct distance.
    pub weight_distance: f64,
    /// Coefficient on the disagreement (or estimation deficit) term.
    pub weight_disagreement: f64,
    /// Constant term of the pre-weight.
    pub weight_baseline: f64,
    /// Relative disagreement `|a-b| / |a+b| * 15` instead of absolute `|a-b|`.
    pub relative_disagreement: bool,
    /// `pre^-alpha` instead of `exp(-pre)`.
    pub fraction_instead_of_exponent: bool,

    // -- Stress gate ---------------------------------------------------------

    /// Lower bound on average stress; negative disables it.
    pub stress_threshold_min: f64,
    /// Upper bound on average stress; negative disables it.
    pub stress_threshold_max: f64,
    pub stress_gate: StressGatePolicy,

    // -- Gap estimator -------------------------------------------------------

    /// Blend toward the triangle upper bound, in [0, 0.5]. 0 is an even split.
    pub gap_bias: f64,

    // -- Embedding -----------------------------------------------------------

    pub mds_scaling: MdsScaling,
    /// Relax with unit weights before the weighted pass.
    pub smacof_warm_start: bool,

    // -- Iteration bounds ----------------------------------------------------

    pub plain_max_iters: usize,
    /// Relative stress change at which the Laplacian variant stops.
    pub plain_tol: f64,
    pub smacof_max_iters: usize,
    /// Relative stress change at which the weighted variant stops.
    pub smacof_tol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: 2.66,
            weight_distance: 0.26,
            weight_disagreement: 0.32,
            weight_baseline: 8.95,
            relative_disagreement: false,
            fraction_instead_of_exponent: false,
            stress_threshold_min: -1.0,
            stress_threshold_max: -1.0,
            stress_gate: StressGatePolicy::Substitute,
            gap_bias: 0.0,
            mds_scaling: MdsScaling::SqrtEigenvalue,
            smacof_warm_start: true,
            plain_max_iters: 100,
            plain_tol: 1e-4,
            smacof_max_iters: 100,
            smacof_tol: 1e-5,
        }
    }
}

impl Config {
    /// Reject settings that would make every resolution fail or misbehave.
    pub fn validate(&self) -> Result<()> {
        let coefficients = [
            ("alpha", self.alpha),
            ("weight_distance", self.weight_distance),
            ("weight_disagreement", self.weight_disagreement),
            ("weight_baseline", self.weight_baseline),
            ("stress_threshold_min", self.stress_threshold_min),
            ("stress_threshold_max", self.stress_threshold_max),
            ("plain_tol", self.plain_tol),
            ("smacof_tol", self.smacof_tol),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() {
                return Err(ResolveError::invalid_input(format!(
                    "{name} must be finite (got {value})"
                )));
            }
        }
        if !(0.0..=0.5).contains(&self.gap_bias) {
            return Err(ResolveError::invalid_input(format!(
                "gap_bias must lie in [0, 0.5] (got {})",
                self.gap_bias
            )));
        }
        if self.plain_tol < 0.0 || self.smacof_tol < 0.0 {
            return Err(ResolveError::invalid_input("tolerances must be >= 0"));
        }
        if self.stress_threshold_min >= 0.0
            && self.stress_threshold_max >= 0.0
            && self.stress_threshold_min > self.stress_threshold_max
        {
            return Err(ResolveError::invalid_input(
                "stress_threshold_min exceeds stress_threshold_max",
            ));
        }
        Ok(())
    }

    /// Whether `average_stress` falls inside the enabled threshold band.
    pub fn stress_within_thresholds(&self, average_stress: f64) -> bool {
        let above_min =
            self.stress_threshold_min < 0.0 || self.stress_threshold_min < average_stress;
        let below_max =
            self.stress_threshold_max < 0.0 || average_stress < self.stress_threshold_max;
        above_min && below_max
    }
}
