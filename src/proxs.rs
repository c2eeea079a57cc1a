//! Proximal operators: projections onto the factor constraint sets.
//!
//! Each operator is a pure function of (input, parameter).  Rescaling to a
//! target norm only happens when the current norm is strictly positive, so
//! an all-zero projection stays zero.

use ndarray::Array2;

use crate::linalg::frobenius_norm;
use crate::types::{Constraint, Entry};

impl<T: Entry> Constraint<T> {
    /// Project `x` onto this constraint set.
    pub fn project(&self, x: &Array2<T>) -> Array2<T> {
        match self {
            Self::Sparse { nnz, .. } => prox_sp(x, *nnz),
            Self::SparseCols { nnz, .. } => prox_spcol(x, *nnz),
            Self::SparseRows { nnz, .. } => prox_splin(x, *nnz),
            Self::NormCols { norm, .. } => prox_normcol(x, *norm),
            Self::NormRows { norm, .. } => prox_normlin(x, *norm),
            Self::Positive { .. } => prox_pos(x),
            Self::SparsePositive { nnz, .. } => prox_sp_pos(x, *nnz),
            Self::Constant { value } => value.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

/// Rescale to unit Frobenius norm; zero stays zero.
fn normalize<T: Entry>(mut x: Array2<T>) -> Array2<T> {
    let norm = frobenius_norm(&x);
    if norm > 0.0 && norm.is_finite() {
        let inv = 1.0 / norm;
        x.mapv_inplace(|v| v.scale(inv));
    }
    x
}

/// Positions of the `s` largest-magnitude values.  The sort is stable, so
/// among equal magnitudes the lower position wins.
fn largest_positions<T: Entry>(values: &[T], s: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].norm_sqr().total_cmp(&values[a].norm_sqr()));
    order.truncate(s.min(values.len()));
    order
}

// ─────────────────────────────────────────────────────────────
//  Sparsity
// ─────────────────────────────────────────────────────────────

/// Keep the `s` largest entries of the whole matrix (row-major flattening),
/// then normalise.
pub fn prox_sp<T: Entry>(x: &Array2<T>, s: usize) -> Array2<T> {
    let cols = x.ncols();
    let flat: Vec<T> = x.iter().copied().collect();
    let mut out = Array2::zeros(x.dim());
    for idx in largest_positions(&flat, s) {
        out[[idx / cols, idx % cols]] = flat[idx];
    }
    normalize(out)
}

/// Keep the `s` largest entries of every column, then normalise the whole
/// matrix (not column by column).
pub fn prox_spcol<T: Entry>(x: &Array2<T>, s: usize) -> Array2<T> {
    let mut out = Array2::zeros(x.dim());
    for (j, col) in x.columns().into_iter().enumerate() {
        let values: Vec<T> = col.iter().copied().collect();
        for i in largest_positions(&values, s) {
            out[[i, j]] = values[i];
        }
    }
    normalize(out)
}

/// Row-wise counterpart of [`prox_spcol`].
pub fn prox_splin<T: Entry>(x: &Array2<T>, s: usize) -> Array2<T> {
    prox_spcol(&x.t().to_owned(), s).reversed_axes()
}

// ─────────────────────────────────────────────────────────────
//  Norms
// ─────────────────────────────────────────────────────────────

/// Rescale every column to Euclidean norm `s`.
///
/// A zero column has no direction; it becomes the constant column
/// `s / sqrt(rows)`, which has norm `s`.
pub fn prox_normcol<T: Entry>(x: &Array2<T>, s: f64) -> Array2<T> {
    let mut out = x.clone();
    let fill = T::from_real(s / (x.nrows() as f64).sqrt());
    for mut col in out.columns_mut() {
        let norm = col.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            let factor = s / norm;
            col.mapv_inplace(|v| v.scale(factor));
        } else {
            col.fill(fill);
        }
    }
    out
}

/// Row-wise counterpart of [`prox_normcol`].
pub fn prox_normlin<T: Entry>(x: &Array2<T>, s: f64) -> Array2<T> {
    prox_normcol(&x.t().to_owned(), s).reversed_axes()
}

// ─────────────────────────────────────────────────────────────
//  Sign
// ─────────────────────────────────────────────────────────────

/// Projection onto non-negative reals, then normalise.  Complex entries
/// lose their imaginary part.
pub fn prox_pos<T: Entry>(x: &Array2<T>) -> Array2<T> {
    normalize(x.mapv(|v| T::from_real(v.re().max(0.0))))
}

pub fn prox_sp_pos<T: Entry>(x: &Array2<T>, s: usize) -> Array2<T> {
    prox_sp(&prox_pos(x), s)
}
