//! Dense distance matrices: assembly from an entry table, gap filling, symmetrization.

use nalgebra::DMatrix;

use crate::entry_table::{CanonicalIndex, EntryTable, NodeId};
use crate::error::{ResolveError, Result, Stage};
use crate::graph_drawer::weights::disagreement;

/// Cell value meaning "distance unknown".
pub const UNKNOWN: f64 = -1.0;

/// Maximum nodes in one neighborhood.
pub const MAX_NODES: usize = 512;

pub(crate) fn is_known(v: f64) -> bool {
    v >= 0.0
}

// ---------------------------------------------------------------------
//  Assembler
// ---------------------------------------------------------------------

/// Build the dense distance matrix for `caller` over the table's canonical index.
///
/// Only the caller's row and its direct neighbors' rows are populated; every
/// other off-diagonal cell is [`UNKNOWN`]. The diagonal is always 0.
pub fn assemble(table: &EntryTable, caller: NodeId) -> Result<(CanonicalIndex, DMatrix<f64>)> {
    if table.is_empty() {
        return Err(ResolveError::invalid_input("entry table is empty"));
    }
    let caller_row = table
        .row(caller)
        .ok_or_else(|| ResolveError::invalid_input(format!("caller {caller} has no entry")))?;

    let index = table.canonical_index(caller);
    let n = index.len();
    if n > MAX_NODES {
        return Err(ResolveError::invalid_input(format!(
            "neighborhood of {n} nodes exceeds maximum allowed ({MAX_NODES})"
        )));
    }

    let mut m = DMatrix::<f64>::from_element(n, n, UNKNOWN);
    for i in 0..n {
        m[(i, i)] = 0.0;
    }

    let mut populated: Vec<NodeId> = caller_row.keys().copied().collect();
    populated.push(caller);
    for reporter in populated {
        let Some(row) = table.row(reporter) else {
            continue;
        };
        let Some(i) = index.index_of(reporter) else {
            continue;
        };
        for (&neighbor, &distance) in row {
            if neighbor == reporter {
                continue;
            }
            if let Some(j) = index.index_of(neighbor) {
                m[(i, j)] = distance;
            }
        }
    }

    Ok((index, m))
}

// ---------------------------------------------------------------------
//  Gap estimator
// ---------------------------------------------------------------------

/// Output of [`fill_gaps`].
#[derive(Debug, Clone)]
pub struct GapFill {
    /// Input matrix with every unknown cell replaced by an estimate.
    pub filled: DMatrix<f64>,
    /// Disagreement accumulated along the paths that produced each estimate;
    /// 0 for cells that were measured.
    pub deficits: DMatrix<f64>,
}

/// Best estimate of one unknown cell, before blending.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellBounds {
    /// Shortest known two-hop path and the disagreement along it.
    pub upper: Option<(f64, f64)>,
    /// Nearest positive leg out of i or into j and its disagreement.
    pub lower: Option<(f64, f64)>,
}

impl CellBounds {
    /// Blend the bounds: `(0.5 + bias)·B + (0.5 − bias)·b`, clamped to `[0, B]`.
    ///
    /// Returns NaN when neither bound exists.
    pub fn estimate(&self, bias: f64) -> f64 {
        match (self.upper, self.lower) {
            (Some((upper, _)), Some((lower, _))) => {
                let blended = (0.5 + bias) * upper + (0.5 - bias) * lower;
                blended.min(upper).max(0.0)
            }
            (Some((upper, _)), None) => upper.max(0.0),
            (None, Some((lower, _))) => lower.max(0.0),
            (None, None) => f64::NAN,
        }
    }

    pub fn deficit(&self) -> f64 {
        self.upper.map(|(_, d)| d).unwrap_or(0.0) + self.lower.map(|(_, d)| d).unwrap_or(0.0)
    }
}

/// Distance between `x` and `y` as reported by `x`, or by `y` when `x` said nothing.
fn leg(m: &DMatrix<f64>, x: usize, y: usize) -> Option<f64> {
    let forward = m[(x, y)];
    if is_known(forward) {
        return Some(forward);
    }
    let reverse = m[(y, x)];
    is_known(reverse).then_some(reverse)
}

/// Disagreement between the two orientations of a leg; 0 unless both were reported.
fn leg_disagreement(m: &DMatrix<f64>, x: usize, y: usize, relative: bool) -> f64 {
    let a = m[(x, y)];
    let b = m[(y, x)];
    if is_known(a) && is_known(b) {
        disagreement(a, b, relative)
    } else {
        0.0
    }
}

/// Triangle-inequality upper bound and nearest-visibility lower bound for cell (i, j).
///
/// Index 0 is the anchor: it is tried first, so ties on the upper bound resolve to it.
pub fn cell_bounds(m: &DMatrix<f64>, i: usize, j: usize, relative: bool) -> CellBounds {
    let n = m.nrows();
    let mut bounds = CellBounds::default();

    for h in 0..n {
        if h == i || h == j {
            continue;
        }
        let to_h = leg(m, i, h);
        let from_h = leg(m, h, j);

        if let (Some(a), Some(b)) = (to_h, from_h) {
            let candidate = a + b;
            if bounds.upper.map_or(true, |(best, _)| candidate < best) {
                let deficit =
                    leg_disagreement(m, i, h, relative) + leg_disagreement(m, j, h, relative);
                bounds.upper = Some((candidate, deficit));
            }
        }

        if let Some(a) = to_h.filter(|v| *v > 0.0) {
            if bounds.lower.map_or(true, |(best, _)| a < best) {
                bounds.lower = Some((a, leg_disagreement(m, i, h, relative)));
            }
        }
        if let Some(b) = from_h.filter(|v| *v > 0.0) {
            if bounds.lower.map_or(true, |(best, _)| b < best) {
                bounds.lower = Some((b, leg_disagreement(m, h, j, relative)));
            }
        }
    }

    bounds
}

/// Replace every unknown cell with a blend of its triangle bounds.
///
/// All estimates read the unfilled input, so the result does not depend on
/// the order cells are visited in.
pub fn fill_gaps(raw: &DMatrix<f64>, bias: f64, relative: bool) -> GapFill {
    let n = raw.nrows();
    let mut filled = raw.clone();
    let mut deficits = DMatrix::<f64>::zeros(n, n);

    for i in 0..n {
        for j in 0..n {
            if i == j || is_known(raw[(i, j)]) {
                continue;
            }
            let bounds = cell_bounds(raw, i, j, relative);
            filled[(i, j)] = bounds.estimate(bias);
            deficits[(i, j)] = bounds.deficit();
        }
    }

    GapFill { filled, deficits }
}

// ---------------------------------------------------------------------
//  Symmetrizer and checks
// ---------------------------------------------------------------------

/// Average each transposed pair in place so that `m[(i, j)] == m[(j, i)]` exactly.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let average = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = average;
            m[(j, i)] = average;
        }
    }
}

/// Symmetric targets read from the reports themselves: the mean of both
/// orientations, or the one that was reported. Pairs nobody reported take
/// their value from `fallback`.
pub fn reported_targets(raw: &DMatrix<f64>, fallback: &DMatrix<f64>) -> DMatrix<f64> {
    let n = raw.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 0.0;
        }
        let (forward, reverse) = (raw[(i, j)], raw[(j, i)]);
        match (is_known(forward), is_known(reverse)) {
            (true, true) => 0.5 * (forward + reverse),
            (true, false) => forward,
            (false, true) => reverse,
            (false, false) => fallback[(i, j)],
        }
    })
}

/// Fail with [`ResolveError::NumericAnomaly`] if any cell is NaN or infinite.
pub fn ensure_finite(m: &DMatrix<f64>, stage: Stage) -> Result<()> {
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let v = m[(i, j)];
            if !v.is_finite() {
                return Err(ResolveError::numeric(
                    stage,
                    format!("non-finite value {v} at ({i}, {j})"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_table::Row;

    fn triangle_table() -> EntryTable {
        let mut t = EntryTable::new();
        t.insert(0, 1, 5.0);
        t.insert(0, 2, 5.0);
        t.insert(1, 0, 5.0);
        t.insert(1, 2, 8.0);
        t.insert_row(2, Row::new());
        t
    }

    #[test]
    fn assemble_marks_unknowns_and_zero_diagonal() {
        let (index, m) = assemble(&triangle_table(), 0).unwrap();
        assert_eq!(index.ids(), &[0, 1, 2]);
        assert_eq!(m[(0, 1)], 5.0);
        assert_eq!(m[(1, 2)], 8.0);
        assert_eq!(m[(2, 0)], UNKNOWN);
        assert_eq!(m[(2, 1)], UNKNOWN);
        for i in 0..3 {
            assert_eq!(m[(i, i)], 0.0);
        }
    }

    #[test]
    fn assemble_only_populates_caller_and_direct_neighbors() {
        let mut t = EntryTable::new();
        t.insert(0, 1, 3.0);
        t.insert(1, 0, 3.0);
        t.insert(1, 2, 4.0);
        t.insert(2, 1, 4.0); // 2 is not a neighbor of 0
        let (index, m) = assemble(&t, 0).unwrap();
        let i2 = index.index_of(2).unwrap();
        let i1 = index.index_of(1).unwrap();
        assert_eq!(m[(i1, i2)], 4.0);
        assert_eq!(m[(i2, i1)], UNKNOWN);
    }

    #[test]
    fn assemble_rejects_missing_caller_and_empty_table() {
        assert!(matches!(
            assemble(&EntryTable::new(), 0),
            Err(ResolveError::InvalidInput { .. })
        ));
        assert!(matches!(
            assemble(&triangle_table(), 42),
            Err(ResolveError::InvalidInput { .. })
        ));
    }

    #[test]
    fn triangle_completion_stays_within_bounds() {
        let (_, m) = assemble(&triangle_table(), 0).unwrap();
        let gaps = fill_gaps(&m, 0.0, false);

        // 2 -> 0: path through 1 is 8 + 5 = 13, nearest leg is 5 -> 9.
        let est_20 = gaps.filled[(2, 0)];
        assert!((5.0..=10.0).contains(&est_20), "got {est_20}");
        assert!((est_20 - 9.0).abs() < 1e-12);

        // 2 -> 1: path through 0 is 5 + 5 = 10.
        let est_21 = gaps.filled[(2, 1)];
        assert!(est_21 <= 10.0 && est_21 >= 5.0, "got {est_21}");

        // Measured cells are untouched.
        assert_eq!(gaps.filled[(1, 2)], 8.0);
        assert_eq!(gaps.deficits[(1, 2)], 0.0);
    }

    #[test]
    fn bias_moves_estimate_toward_upper_bound() {
        let (_, m) = assemble(&triangle_table(), 0).unwrap();
        let even = fill_gaps(&m, 0.0, false).filled[(2, 0)];
        let biased = fill_gaps(&m, 0.5, false).filled[(2, 0)];
        assert!(biased > even);
        assert!((biased - 13.0).abs() < 1e-12);
    }

    #[test]
    fn deficits_follow_disagreement_along_chosen_paths() {
        let mut t = EntryTable::new();
        t.insert(0, 1, 4.0);
        t.insert(0, 2, 6.0);
        t.insert(1, 0, 6.0); // disagreement of 2 on 0-1
        t.insert(1, 2, 5.0);
        t.insert(2, 1, 5.0);
        t.insert(2, 3, 5.0);
        t.insert_row(3, Row::new());
        let (index, m) = assemble(&t, 0).unwrap();
        let i3 = index.index_of(3).unwrap();
        let gaps = fill_gaps(&m, 0.0, false);
        // Cell (0, 3) routes through 2 (6 + 5) with no disagreement on either leg.
        // The nearest leg is 0->1 = 4, whose two reports differ by 2.
        assert!((gaps.deficits[(0, i3)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn symmetrize_is_exact_and_keeps_diagonal() {
        let mut m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 7.0, 0.0]);
        symmetrize(&mut m);
        for i in 0..3 {
            assert_eq!(m[(i, i)], 0.0);
            for j in 0..3 {
                assert_eq!(m[(i, j)], m[(j, i)]);
            }
        }
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 2)], 5.5);
    }

    #[test]
    fn reported_targets_ignore_gap_estimates() {
        let (_, m) = assemble(&triangle_table(), 0).unwrap();
        let mut filled = fill_gaps(&m, 0.0, false).filled;
        symmetrize(&mut filled);
        // 0 -> 2 was reported as 5; the symmetrized matrix mixes in the
        // estimate for 2 -> 0.
        assert!((filled[(0, 2)] - 7.0).abs() < 1e-12);

        let targets = reported_targets(&m, &filled);
        assert_eq!(targets[(0, 2)], 5.0);
        assert_eq!(targets[(2, 0)], 5.0);
        assert_eq!(targets[(1, 2)], 8.0);
        assert_eq!(targets[(0, 1)], 5.0);
        assert_eq!(targets[(1, 1)], 0.0);
    }

    #[test]
    fn ensure_finite_reports_stage() {
        let mut m = DMatrix::<f64>::zeros(2, 2);
        assert!(ensure_finite(&m, Stage::GapFill).is_ok());
        m[(1, 0)] = f64::NAN;
        match ensure_finite(&m, Stage::GapFill) {
            Err(ResolveError::NumericAnomaly { stage, .. }) => assert_eq!(stage, Stage::GapFill),
            other => panic!("expected numeric anomaly, got {other:?}"),
        }
    }
}
