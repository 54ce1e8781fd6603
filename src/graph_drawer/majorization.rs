//! Stress majorization: move embedded points so their pairwise distances
//! approach the targets, weighted by confidence.
//!
//! Two variants:
//! - [`majorize_plain`] solves the Laplacian system `L_w X = L_Z X` with `L_w`
//!   factorized once; gauge fixed by pinning index 0 at the origin.
//! - [`majorize_weighted`] is the coordinate-wise SMACOF (Jacobi) update, all
//!   nodes computed from the previous iterate and committed together.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, Dyn};
use tracing::debug;

use crate::error::{ResolveError, Result, Stage};
use crate::graph_drawer::matrix::ensure_finite;
use crate::graph_drawer::mds::row_distance;

/// Where a majorization run stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MajorizationOutcome {
    pub iterations: usize,
    /// Stress of the final embedding.
    pub stress: f64,
    /// Relative stress change of the last iteration.
    pub last_change: f64,
    /// True when the tolerance was met before the iteration cap.
    pub converged: bool,
}

/// `Σ_{i<j} w(i,j) (‖p_i − p_j‖ − d(i,j))²`.
pub fn stress(embedding: &DMatrix<f64>, targets: &DMatrix<f64>, weights: &DMatrix<f64>) -> f64 {
    let n = embedding.nrows();
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let r = row_distance(embedding, i, j) - targets[(i, j)];
            total += weights[(i, j)] * r * r;
        }
    }
    total
}

fn relative_change(prev: f64, next: f64) -> f64 {
    if prev > 0.0 {
        (prev - next).abs() / prev
    } else {
        0.0
    }
}

/// `1/‖p_i − p_j‖`, or 0 for coincident points.
fn inverse_distances(embedding: &DMatrix<f64>) -> DMatrix<f64> {
    let n = embedding.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 0.0;
        }
        let d = row_distance(embedding, i, j);
        if d > 0.0 {
            1.0 / d
        } else {
            0.0
        }
    })
}

// ---------------------------------------------------------------------
//  Plain (Laplacian) variant
// ---------------------------------------------------------------------

/// `L_w` with row and column 0 removed.
fn reduced_laplacian(weights: &DMatrix<f64>) -> DMatrix<f64> {
    let n = weights.nrows();
    let mut l = DMatrix::<f64>::zeros(n - 1, n - 1);
    for i in 1..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            if i == j {
                continue;
            }
            let w = weights[(i, j)];
            row_sum += w;
            if j > 0 {
                l[(i - 1, j - 1)] = -w;
            }
        }
        l[(i - 1, i - 1)] = row_sum;
    }
    l
}

/// Laplacian stress majorization.
///
/// `embedding` is updated in place and ends with index 0 at the origin.
/// Fails with [`ResolveError::DegenerateGeometry`] when the gauge-fixed
/// Laplacian is singular (some node carries no weight).
pub fn majorize_plain(
    embedding: &mut DMatrix<f64>,
    targets: &DMatrix<f64>,
    weights: &DMatrix<f64>,
    max_iters: usize,
    tol: f64,
) -> Result<MajorizationOutcome> {
    let n = embedding.nrows();
    let dim = embedding.ncols();
    let mut prev = stress(embedding, targets, weights);
    let mut outcome = MajorizationOutcome {
        iterations: 0,
        stress: prev,
        last_change: 0.0,
        converged: true,
    };
    if n < 2 || prev == 0.0 {
        return Ok(outcome);
    }

    let laplacian = reduced_laplacian(weights);
    let anchor_weight: f64 = (1..n).map(|j| weights[(0, j)]).sum();
    if anchor_weight <= 0.0 || laplacian.diagonal().iter().any(|&d| d <= 0.0) {
        return Err(ResolveError::degenerate("weighted Laplacian has an isolated node"));
    }
    let chol: Cholesky<f64, Dyn> = Cholesky::new(laplacian)
        .ok_or_else(|| ResolveError::degenerate("weighted Laplacian is singular"))?;
    outcome.converged = false;

    for iter in 1..=max_iters {
        let origin = embedding.row(0).clone_owned();
        for i in 0..n {
            for k in 0..dim {
                embedding[(i, k)] -= origin[k];
            }
        }

        let inv = inverse_distances(embedding);
        let mut l_z = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let mut row_sum = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let v = -weights[(i, j)] * targets[(i, j)] * inv[(i, j)];
                l_z[(i, j)] = v;
                row_sum += v;
            }
            l_z[(i, i)] = -row_sum;
        }

        let rhs_full = &l_z * &*embedding;
        let rhs = rhs_full.rows(1, n - 1).clone_owned();
        let solved = chol.solve(&rhs);
        for k in 0..dim {
            embedding[(0, k)] = 0.0;
        }
        embedding.rows_mut(1, n - 1).copy_from(&solved);
        ensure_finite(embedding, Stage::Majorization)?;

        let next = stress(embedding, targets, weights);
        let change = relative_change(prev, next);
        outcome = MajorizationOutcome {
            iterations: iter,
            stress: next,
            last_change: change,
            converged: change < tol,
        };
        prev = next;
        if outcome.converged {
            break;
        }
    }

    debug!(
        iterations = outcome.iterations,
        stress = outcome.stress,
        converged = outcome.converged,
        "plain majorization finished"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------
//  Weighted SMACOF variant
// ---------------------------------------------------------------------

/// One Jacobi sweep: every node moves to the weighted average of where its
/// neighbors say it should be, computed from the previous positions.
fn smacof_step(embedding: &DMatrix<f64>, targets: &DMatrix<f64>, weights: &DMatrix<f64>) -> DMatrix<f64> {
    let n = embedding.nrows();
    let dim = embedding.ncols();
    let inv = inverse_distances(embedding);
    let mut next = embedding.clone();

    for i in 0..n {
        let mut denom = 0.0;
        let mut num = vec![0.0; dim];
        for j in 0..n {
            if i == j {
                continue;
            }
            let w = weights[(i, j)];
            let pull = targets[(i, j)] * inv[(i, j)];
            denom += w;
            for k in 0..dim {
                let pj = embedding[(j, k)];
                num[k] += w * (pj + pull * (embedding[(i, k)] - pj));
            }
        }
        if denom > 0.0 {
            for k in 0..dim {
                next[(i, k)] = num[k] / denom;
            }
        }
    }
    next
}

/// Weighted SMACOF. `embedding` is replaced by the final iterate.
pub fn majorize_weighted(
    embedding: &mut DMatrix<f64>,
    targets: &DMatrix<f64>,
    weights: &DMatrix<f64>,
    max_iters: usize,
    tol: f64,
) -> Result<MajorizationOutcome> {
    let mut prev = stress(embedding, targets, weights);
    let mut outcome = MajorizationOutcome {
        iterations: 0,
        stress: prev,
        last_change: 0.0,
        converged: true,
    };
    if embedding.nrows() < 2 || prev == 0.0 {
        return Ok(outcome);
    }
    outcome.converged = false;

    for iter in 1..=max_iters {
        *embedding = smacof_step(embedding, targets, weights);
        ensure_finite(embedding, Stage::Majorization)?;

        let next = stress(embedding, targets, weights);
        let change = relative_change(prev, next);
        outcome = MajorizationOutcome {
            iterations: iter,
            stress: next,
            last_change: change,
            converged: change < tol,
        };
        prev = next;
        if outcome.converged {
            break;
        }
    }

    debug!(
        iterations = outcome.iterations,
        stress = outcome.stress,
        converged = outcome.converged,
        "weighted majorization finished"
    );
    Ok(outcome)
}
