//! Classical (Torgerson) multidimensional scaling into the plane.

use std::cmp::Ordering;

use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;
use tracing::debug;

use crate::config::MdsScaling;
use crate::error::{ResolveError, Result, Stage};
use crate::graph_drawer::matrix::ensure_finite;

/// Embedding dimension.
pub const DIM: usize = 2;

/// Eigenvalues below this fraction of the dominant one count as zero.
const EIGEN_REL_FLOOR: f64 = 1e-12;

/// Double-centered Gram matrix `B = -1/2 · J P J` with `P` the squared distances.
pub fn gram_matrix(distances: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distances.nrows();
    let p = distances.map(|d| d * d);
    let centering = DMatrix::<f64>::identity(n, n) - DMatrix::from_element(n, n, 1.0 / n as f64);
    let b = &centering * p * &centering * -0.5;
    // Round-off can leave B slightly asymmetric; the eigensolver reads one triangle.
    (&b + b.transpose()) * 0.5
}

/// Planar embedding from the two dominant eigenpairs of the Gram matrix.
///
/// Returns an `n × 2` matrix whose row i is the position of canonical index i.
pub fn classical_mds(distances: &DMatrix<f64>, scaling: MdsScaling) -> Result<DMatrix<f64>> {
    let n = distances.nrows();
    if n < DIM {
        return Err(ResolveError::degenerate(format!(
            "{n} node(s) cannot span a planar embedding"
        )));
    }

    let eig = SymmetricEigen::new(gram_matrix(distances));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });

    let lambda_1 = eig.eigenvalues[order[0]];
    let lambda_2 = eig.eigenvalues[order[1]];
    if !lambda_1.is_finite() || !lambda_2.is_finite() {
        return Err(ResolveError::numeric(
            Stage::Mds,
            format!("non-finite eigenvalues ({lambda_1}, {lambda_2})"),
        ));
    }
    let floor = EIGEN_REL_FLOOR * lambda_1.abs().max(1.0);
    if lambda_1 <= floor || lambda_2 <= floor {
        return Err(ResolveError::degenerate(format!(
            "dominant eigenvalues not positive (λ₁ = {lambda_1:.3e}, λ₂ = {lambda_2:.3e})"
        )));
    }

    let mut embedding = DMatrix::<f64>::zeros(n, DIM);
    for (k, &col) in order.iter().take(DIM).enumerate() {
        let lambda = eig.eigenvalues[col];
        let factor = match scaling {
            MdsScaling::SqrtEigenvalue => lambda.sqrt(),
            MdsScaling::InverseSqrt => 1.0 / lambda.sqrt(),
        };
        for i in 0..n {
            embedding[(i, k)] = eig.eigenvectors[(i, col)] * factor;
        }
    }

    ensure_finite(&embedding, Stage::Mds)?;
    debug!(n, lambda_1, lambda_2, "classical MDS embedding");
    Ok(embedding)
}

/// Euclidean distance between rows `i` and `j` of an embedding.
pub fn row_distance(embedding: &DMatrix<f64>, i: usize, j: usize) -> f64 {
    let mut acc = 0.0;
    for k in 0..embedding.ncols() {
        let d = embedding[(i, k)] - embedding[(j, k)];
        acc += d * d;
    }
    acc.sqrt()
}
