//! Per-pair confidence weights.
//!
//! Pairs whose two reports disagree, or whose distance had to be estimated
//! along disagreeing legs, get less say in the majorization.

use nalgebra::DMatrix;

use crate::config::Config;
use crate::graph_drawer::matrix::is_known;

/// Scale applied to relative disagreement.
pub const RELATIVE_DISAGREEMENT_SCALE: f64 = 15.0;

/// Disagreement between two reports of the same distance.
///
/// Absolute mode: `|a - b|`. Relative mode: `|a - b| / |a + b| * 15`, and 0 when both are 0.
pub fn disagreement(a: f64, b: f64, relative: bool) -> f64 {
    let diff = (a - b).abs();
    if !relative {
        return diff;
    }
    let sum = (a + b).abs();
    if sum == 0.0 {
        0.0
    } else {
        diff / sum * RELATIVE_DISAGREEMENT_SCALE
    }
}

/// Pre-weight for one pair: `baseline + distance * avg(d_ij, d_ji) + disagreement * dis`.
pub fn pre_weight(d_ij: f64, d_ji: f64, dis: f64, cfg: &Config) -> f64 {
    cfg.weight_baseline + cfg.weight_distance * 0.5 * (d_ij + d_ji) + cfg.weight_disagreement * dis
}

/// Map a pre-weight to a weight. Exponential weights are floored at the
/// smallest positive normal.
pub fn weight_from_pre(pre: f64, cfg: &Config) -> f64 {
    if cfg.fraction_instead_of_exponent {
        pre.powf(-cfg.alpha)
    } else {
        (-pre).exp().max(f64::MIN_POSITIVE)
    }
}

/// Build the weight matrix from the filled (not yet symmetrized) distances.
///
/// A nonzero deficit replaces the pair's direct disagreement. The diagonal is 1.
/// The result is not symmetric; run it through
/// [`symmetrize`](crate::graph_drawer::matrix::symmetrize) before solving.
pub fn build_weights(filled: &DMatrix<f64>, deficits: &DMatrix<f64>, cfg: &Config) -> DMatrix<f64> {
    let n = filled.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 1.0;
        }
        let d_ij = filled[(i, j)];
        let d_ji = filled[(j, i)];
        let deficit = deficits[(i, j)];
        let dis = if deficit != 0.0 {
            deficit
        } else {
            disagreement(d_ij, d_ji, cfg.relative_disagreement)
        };
        weight_from_pre(pre_weight(d_ij, d_ji, dis, cfg), cfg)
    })
}

/// 1 on every pair with at least one report in the assembled matrix, 0 on
/// gap-filled pairs and the diagonal.
///
/// A node with no reported pair at all is tied to every other node at
/// weight 1, so the gauge-fixed Laplacian stays nonsingular.
pub fn reported_mask(raw: &DMatrix<f64>) -> DMatrix<f64> {
    let n = raw.nrows();
    let mut mask = DMatrix::from_fn(n, n, |i, j| {
        if i != j && (is_known(raw[(i, j)]) || is_known(raw[(j, i)])) {
            1.0
        } else {
            0.0
        }
    });
    for i in 0..n {
        if mask.row(i).iter().all(|&w| w == 0.0) {
            for j in (0..n).filter(|&j| j != i) {
                mask[(i, j)] = 1.0;
                mask[(j, i)] = 1.0;
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_disagreement_handles_zero_pair() {
        assert_eq!(disagreement(0.0, 0.0, true), 0.0);
        assert!((disagreement(4.0, 6.0, true) - 3.0).abs() < 1e-12);
        assert!((disagreement(4.0, 6.0, false) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn agreeing_pairs_outweigh_disagreeing_ones() {
        let cfg = Config::default();
        let filled = DMatrix::from_row_slice(3, 3, &[0.0, 5.0, 5.0, 5.0, 0.0, 4.0, 9.0, 4.0, 0.0]);
        let deficits = DMatrix::<f64>::zeros(3, 3);
        let w = build_weights(&filled, &deficits, &cfg);
        // (0,1) agree at 5; (0,2) average 7 and disagree by 4.
        assert!(w[(0, 1)] > w[(0, 2)]);
        assert_eq!(w[(1, 1)], 1.0);
    }

    #[test]
    fn deficit_overrides_direct_disagreement() {
        let cfg = Config::default();
        let filled = DMatrix::from_row_slice(2, 2, &[0.0, 5.0, 5.0, 0.0]);
        let mut deficits = DMatrix::<f64>::zeros(2, 2);
        deficits[(0, 1)] = 10.0;
        let w = build_weights(&filled, &deficits, &cfg);
        let expected = (-(cfg.weight_baseline + cfg.weight_distance * 5.0 + cfg.weight_disagreement * 10.0)).exp();
        assert!((w[(0, 1)] - expected).abs() < 1e-18);
        assert!(w[(0, 1)] < w[(1, 0)]);
    }

    #[test]
    fn mask_keeps_reported_pairs_only() {
        // 0 and 1 report each other, 1 reports 2 one-sidedly, 0-2 is unknown.
        let raw = DMatrix::from_row_slice(3, 3, &[0.0, 4.0, -1.0, 4.0, 0.0, 3.0, -1.0, -1.0, 0.0]);
        let mask = reported_mask(&raw);
        assert_eq!(mask[(0, 1)], 1.0);
        assert_eq!(mask[(1, 2)], 1.0);
        assert_eq!(mask[(2, 1)], 1.0);
        assert_eq!(mask[(0, 2)], 0.0);
        assert_eq!(mask[(2, 0)], 0.0);
        for i in 0..3 {
            assert_eq!(mask[(i, i)], 0.0);
        }
    }

    #[test]
    fn mask_ties_unreported_nodes_to_everyone() {
        let raw = DMatrix::from_row_slice(3, 3, &[0.0, 4.0, -1.0, 4.0, 0.0, -1.0, -1.0, -1.0, 0.0]);
        let mask = reported_mask(&raw);
        assert_eq!(mask[(2, 0)], 1.0);
        assert_eq!(mask[(0, 2)], 1.0);
        assert_eq!(mask[(1, 2)], 1.0);
        assert_eq!(mask[(2, 2)], 0.0);
    }

    #[test]
    fn weights_stay_positive_for_large_pre_weights() {
        let cfg = Config::default();
        assert!(weight_from_pre(1e6, &cfg) > 0.0);

        let frac = Config {
            fraction_instead_of_exponent: true,
            ..Config::default()
        };
        let w = weight_from_pre(10.0, &frac);
        assert!((w - 10f64.powf(-2.66)).abs() < 1e-15);
    }
}
