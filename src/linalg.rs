//! Linear-algebra primitives on factor chains.
//!
//! `multiply_left` / `multiply_right` apply a factorized matrix from one
//! side without developing it, so only thin intermediates are formed.

use ndarray::{Array1, Array2};

use crate::backend::Backend;
use crate::types::{Entry, FactorError};

const POWER_MAX_ITER: usize = 500;
const POWER_TOL: f64 = 1e-12;

// ─────────────────────────────────────────────────────────────
//  Chain products
// ─────────────────────────────────────────────────────────────

/// Every neighbouring pair of `dims` must agree on its inner dimension.
///
/// The reported `index` is the position of the left member of the first
/// failing pair.
fn check_dims(dims: &[(usize, usize)]) -> Result<(), FactorError> {
    for (index, pair) in dims.windows(2).enumerate() {
        let ((_, left_cols), (right_rows, _)) = (pair[0], pair[1]);
        if left_cols != right_rows {
            return Err(FactorError::ChainMismatch {
                index,
                left_cols,
                right_rows,
            });
        }
    }
    Ok(())
}

/// `F_0 · F_1 · … · F_{n-1}`.
///
/// An empty chain is the 1×1 identity.  Neighbours with mismatched inner
/// dimensions are an error, never skipped.
pub fn chain_product<T: Entry, B: Backend>(ctx: &B, factors: &[Array2<T>]) -> Result<Array2<T>, FactorError> {
    let Some((first, rest)) = factors.split_first() else {
        return Ok(Array2::from_elem((1, 1), T::one()));
    };
    let dims: Vec<_> = factors.iter().map(|f| f.dim()).collect();
    check_dims(&dims)?;
    Ok(rest
        .iter()
        .fold(first.clone(), |acc, f| ctx.matmul(&acc.view(), &f.view())))
}

/// `F_0 · … · F_{m-1} · x`, accumulated right-to-left.
///
/// `x` counts as the last member of the product when a mismatch is
/// reported.
pub fn multiply_left<T: Entry, B: Backend>(
    ctx: &B,
    factors: &[Array2<T>],
    x: &Array2<T>,
) -> Result<Array2<T>, FactorError> {
    let dims: Vec<_> = factors.iter().map(|f| f.dim()).chain([x.dim()]).collect();
    check_dims(&dims)?;
    let mut acc = x.clone();
    for f in factors.iter().rev() {
        acc = ctx.matmul(&f.view(), &acc.view());
    }
    Ok(acc)
}

/// `x · F_0 · … · F_{m-1}`, accumulated left-to-right.
///
/// `x` sits at position 0 when a mismatch is reported.
pub fn multiply_right<T: Entry, B: Backend>(
    ctx: &B,
    x: &Array2<T>,
    factors: &[Array2<T>],
) -> Result<Array2<T>, FactorError> {
    let dims: Vec<_> = [x.dim()].into_iter().chain(factors.iter().map(|f| f.dim())).collect();
    check_dims(&dims)?;
    let mut acc = x.clone();
    for f in factors {
        acc = ctx.matmul(&acc.view(), &f.view());
    }
    Ok(acc)
}

// ─────────────────────────────────────────────────────────────
//  Norms and inner products
// ─────────────────────────────────────────────────────────────

pub fn frobenius_norm<T: Entry>(a: &Array2<T>) -> f64 {
    a.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

fn vector_norm<T: Entry>(v: &Array1<T>) -> f64 {
    v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt()
}

/// Conjugate transpose.
pub fn hermitian<T: Entry>(a: &Array2<T>) -> Array2<T> {
    a.t().mapv(|v| v.conj())
}

/// `Re tr(aᴴ b)`, i.e. the real Frobenius inner product.
pub fn inner_product_re<T: Entry>(a: &Array2<T>, b: &Array2<T>) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| (x.conj() * y).re()).sum()
}

/// Largest singular value by power iteration on `aᴴa`.
///
/// The start vector is deterministic.  If it happens to lie in the null
/// space the Frobenius norm, an upper bound, is returned instead.
pub fn spectral_norm<T: Entry>(a: &Array2<T>) -> f64 {
    let fro = frobenius_norm(a);
    if fro == 0.0 {
        return 0.0;
    }
    let ah = hermitian(a);

    let mut v: Array1<T> = Array1::from_shape_fn(a.ncols(), |j| {
        T::from_real(((j as f64 + 1.0) * 0.7123 + 0.3).sin())
    });
    let v_norm = vector_norm(&v);
    v.mapv_inplace(|x| x.scale(1.0 / v_norm));

    let mut sigma = 0.0_f64;
    for _ in 0..POWER_MAX_ITER {
        let u = a.dot(&v);
        let new_sigma = vector_norm(&u);
        if new_sigma == 0.0 {
            return fro;
        }
        let w = ah.dot(&u);
        let w_norm = vector_norm(&w);
        if w_norm == 0.0 {
            return fro;
        }
        v = w.mapv(|x| x.scale(1.0 / w_norm));

        let converged = (new_sigma - sigma).abs() <= POWER_TOL * new_sigma;
        sigma = new_sigma;
        if converged {
            break;
        }
    }
    sigma
}

/// Total number of non-zero entries across all factors.
pub fn count_nonzero<T: Entry>(factors: &[Array2<T>]) -> usize {
    factors
        .iter()
        .map(|f| f.iter().filter(|v| !v.is_zero()).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Cpu;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn empty_chain_is_scalar_one() {
        let p = chain_product::<f64, _>(&Cpu, &[]).unwrap();
        assert_eq!(p, array![[1.0]]);
    }

    #[test]
    fn single_factor_chain_is_unchanged() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let p = chain_product(&Cpu, &[a.clone()]).unwrap();
        assert_eq!(p, a);
    }

    #[test]
    fn chain_matches_explicit_product() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[0.0, 1.0, 2.0], [1.0, 0.0, -1.0]];
        let c = array![[1.0], [2.0], [3.0]];
        let p = chain_product(&Cpu, &[a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(p, a.dot(&b).dot(&c));
    }

    #[test]
    fn mismatched_chain_is_an_error() {
        let a = Array2::<f64>::zeros((2, 3));
        let b = Array2::<f64>::zeros((2, 2));
        let err = chain_product(&Cpu, &[a, b]).unwrap_err();
        assert_eq!(err, FactorError::ChainMismatch { index: 0, left_cols: 3, right_rows: 2 });
    }

    #[test]
    fn multiply_with_empty_list_returns_input() {
        let x = array![[1.0, -2.0], [0.5, 3.0]];
        assert_eq!(multiply_left(&Cpu, &[], &x).unwrap(), x);
        assert_eq!(multiply_right(&Cpu, &x, &[]).unwrap(), x);
    }

    #[test]
    fn multiply_right_single_factor_is_exact_product() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let a = array![[0.5, -1.0, 2.0], [1.5, 0.0, 1.0]];
        assert_eq!(multiply_right(&Cpu, &x, &[a.clone()]).unwrap(), x.dot(&a));
    }

    #[test]
    fn multiply_left_and_right_agree_with_chain() {
        let a = array![[1.0, 2.0], [0.0, 1.0]];
        let b = array![[2.0, 0.0], [1.0, 1.0]];
        let x = array![[1.0, 0.0], [2.0, 3.0]];
        let chain = chain_product(&Cpu, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(multiply_left(&Cpu, &[a.clone(), b.clone()], &x).unwrap(), chain.dot(&x));
        assert_eq!(multiply_right(&Cpu, &x, &[a, b]).unwrap(), x.dot(&chain));
    }

    #[test]
    fn mismatched_multiply_is_an_error() {
        let x = Array2::<f64>::ones((2, 2));
        let err = multiply_right(&Cpu, &x, &[Array2::ones((3, 3))]).unwrap_err();
        assert_eq!(err, FactorError::ChainMismatch { index: 0, left_cols: 2, right_rows: 3 });

        // neighbouring factors disagree before x is reached
        let factors = vec![Array2::<f64>::ones((2, 3)), Array2::ones((2, 2))];
        let err = multiply_left(&Cpu, &factors, &Array2::ones((2, 1))).unwrap_err();
        assert_eq!(err, FactorError::ChainMismatch { index: 0, left_cols: 3, right_rows: 2 });

        // last factor against x
        let err = multiply_left(&Cpu, &[Array2::<f64>::ones((2, 3))], &x).unwrap_err();
        assert_eq!(err, FactorError::ChainMismatch { index: 0, left_cols: 3, right_rows: 2 });
    }

    #[test]
    fn spectral_norm_of_diagonal() {
        let a = array![[3.0, 0.0, 0.0], [0.0, -7.0, 0.0], [0.0, 0.0, 1.0]];
        assert_relative_eq!(spectral_norm(&a), 7.0, max_relative = 1e-9);
    }

    #[test]
    fn spectral_norm_of_rank_one() {
        // u vᵀ with |u| = 5, |v| = 2
        let a = array![[6.0, 0.0], [8.0, 0.0]];
        assert_relative_eq!(spectral_norm(&a), 10.0, max_relative = 1e-9);
        assert_eq!(spectral_norm(&Array2::<f64>::zeros((3, 2))), 0.0);
        assert_relative_eq!(spectral_norm(&array![[1.0]]), 1.0);
    }

    #[test]
    fn spectral_norm_never_exceeds_frobenius() {
        let a = array![[1.0, 2.0, 0.0], [0.0, 1.0, 4.0], [2.0, 0.0, 1.0]];
        let s = spectral_norm(&a);
        assert!(s > 0.0 && s <= frobenius_norm(&a) + 1e-12);
    }

    #[test]
    fn hermitian_conjugates_complex_entries() {
        let a = array![[Complex64::new(1.0, 2.0), Complex64::new(0.0, -1.0)]];
        let h = hermitian(&a);
        assert_eq!(h.dim(), (2, 1));
        assert_eq!(h[[0, 0]], Complex64::new(1.0, -2.0));
        assert_eq!(h[[1, 0]], Complex64::new(0.0, 1.0));
    }

    #[test]
    fn inner_product_matches_trace() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[0.5, -1.0], [2.0, 1.0]];
        let trace: f64 = a.t().dot(&b).diag().sum();
        assert_relative_eq!(inner_product_re(&a, &b), trace);
    }

    #[test]
    fn count_nonzero_over_factors() {
        let a = array![[1.0, 0.0], [0.0, 2.0]];
        let b = array![[0.0, 0.0, 3.0]];
        assert_eq!(count_nonzero(&[a, b]), 3);
    }
}
