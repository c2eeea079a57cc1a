//! Hierarchical factorization: repeated two-factor splits of the outer
//! factor, each followed by a global PALM4MSA refinement of the whole chain
//! against the original data.
//!
//! With right growth the chain evolves as
//!
//! ```text
//! level 0:  X            → A0 · B0
//! level 1:  A0 · B0      → A0 · A1 · B1        (B0 split in two)
//! level 2:  A0 · A1 · B1 → A0 · A1 · A2 · B2
//! ```
//!
//! and symmetrically (prepending) with left growth.

use ndarray::Array2;
use std::iter;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::linalg::{chain_product, count_nonzero, frobenius_norm};
use crate::optimizer::palm4msa;
use crate::types::{
    Constraint, ConstraintGrid, Entry, FactorError, FactorSide, HierarchicalOptions,
    HierarchicalResult, LevelError, PalmOptions, UpdateOrder,
};

// ─────────────────────────────────────────────────────────────
//  Validation
// ─────────────────────────────────────────────────────────────

fn shape_error(level: usize, reason: String) -> FactorError {
    FactorError::ConstraintShape { index: level, reason }
}

/// Chained-equality check of the constraint grid against the data shape.
fn validate_grid<T: Entry>(
    data_dim: (usize, usize),
    n_facts: usize,
    grid: &ConstraintGrid<T>,
    side: FactorSide,
) -> Result<(), FactorError> {
    if n_facts < 2 {
        return Err(FactorError::InvalidParameter(format!(
            "hierarchical factorization needs at least 2 factors, got {n_facts}"
        )));
    }
    let levels = n_facts - 1;
    for found in [grid.left.len(), grid.right.len()] {
        if found != levels {
            return Err(FactorError::ConstraintCountMismatch { expected: levels, found });
        }
    }

    let (rows, cols) = data_dim;
    for k in 0..levels {
        let (l_rows, l_cols) = grid.left[k].shape();
        let (r_rows, r_cols) = grid.right[k].shape();
        if l_cols != r_rows {
            return Err(shape_error(
                k,
                format!("left factor has {l_cols} columns, right factor has {r_rows} rows"),
            ));
        }
        if k == 0 {
            if l_rows != rows || r_cols != cols {
                return Err(shape_error(
                    0,
                    format!("first split is {l_rows}x{r_cols}, data is {rows}x{cols}"),
                ));
            }
            continue;
        }
        match side {
            FactorSide::Right => {
                let prev_cols = grid.left[k - 1].shape().1;
                if l_rows != prev_cols {
                    return Err(shape_error(
                        k,
                        format!("left factor has {l_rows} rows, previous left factor has {prev_cols} columns"),
                    ));
                }
                if r_cols != cols {
                    return Err(shape_error(
                        k,
                        format!("right factor has {r_cols} columns, data has {cols}"),
                    ));
                }
            }
            FactorSide::Left => {
                let prev_rows = grid.right[k - 1].shape().0;
                if r_cols != prev_rows {
                    return Err(shape_error(
                        k,
                        format!("right factor has {r_cols} columns, previous right factor has {prev_rows} rows"),
                    ));
                }
                if l_rows != rows {
                    return Err(shape_error(
                        k,
                        format!("left factor has {l_rows} rows, data has {rows}"),
                    ));
                }
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

/// Rectangular identity.
fn eye<T: Entry>((rows, cols): (usize, usize)) -> Array2<T> {
    Array2::from_shape_fn((rows, cols), |(i, j)| if i == j { T::one() } else { T::zero() })
}

/// Zero/identity seed for a split.  The factor visited first starts at zero,
/// so its first gradient step sees the identity as its neighbour.
fn initial_pair<T: Entry>(left: &Constraint<T>, right: &Constraint<T>, order: UpdateOrder) -> Vec<Array2<T>> {
    match order {
        UpdateOrder::LeftToRight => vec![Array2::zeros(left.shape()), eye(right.shape())],
        UpdateOrder::RightToLeft => vec![eye(left.shape()), Array2::zeros(right.shape())],
    }
}

/// Constraints of the chain after level `k`, ordered left to right.
fn global_constraints<T: Entry>(grid: &ConstraintGrid<T>, k: usize, side: FactorSide) -> Vec<Constraint<T>> {
    match side {
        FactorSide::Right => grid.left[..=k]
            .iter()
            .cloned()
            .chain(iter::once(grid.right[k].clone()))
            .collect(),
        FactorSide::Left => iter::once(grid.left[k].clone())
            .chain(grid.right[..=k].iter().rev().cloned())
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────
//  Top-level entry point
// ─────────────────────────────────────────────────────────────

/// Hierarchically factorize `data` into `n_facts` factors.
///
/// `grid.left[k]` / `grid.right[k]` constrain the two factors produced at
/// level `k`.  Returns the final λ, the `n_facts` factors and one
/// [`LevelError`] per level.
pub fn hierarchical<T: Entry, B: Backend>(
    ctx: &B,
    data: &Array2<T>,
    n_facts: usize,
    grid: &ConstraintGrid<T>,
    options: &HierarchicalOptions,
) -> Result<HierarchicalResult<T>, FactorError> {
    validate_grid(data.dim(), n_facts, grid, options.side)?;

    let levels = n_facts - 1;
    let data_norm = frobenius_norm(data);
    let numel = data.len() as f64;

    let mut lambda = 1.0;
    let mut chain: Vec<Array2<T>> = Vec::with_capacity(n_facts);
    let mut residual = data.clone();
    let mut errors = Vec::with_capacity(levels);

    debug!(backend = ctx.name(), n_facts, side = ?options.side, "hierarchical start");

    for k in 0..levels {
        // 1. split the residual in two
        let pair = [grid.left[k].clone(), grid.right[k].clone()];
        let split_opts = PalmOptions {
            n_iter: options.n_iter_split,
            init_lambda: 1.0,
            verbose: options.verbose,
            update_order: options.update_order,
        };
        let split = palm4msa(
            ctx,
            &residual,
            2,
            &pair,
            initial_pair(&pair[0], &pair[1], options.update_order),
            &split_opts,
        )?;
        lambda *= split.lambda;

        // 2. replace the residual factor by its split
        chain = match options.side {
            FactorSide::Right => {
                let mut next = chain;
                next.truncate(k);
                next.extend(split.factors);
                next
            }
            FactorSide::Left => {
                let mut next = split.factors;
                next.extend(chain.into_iter().skip(1));
                next
            }
        };

        // 3. refine the whole chain against the original data
        let global_opts = PalmOptions {
            n_iter: options.n_iter_global,
            init_lambda: lambda,
            verbose: options.verbose,
            update_order: options.update_order,
        };
        let refined = palm4msa(
            ctx,
            data,
            k + 2,
            &global_constraints(grid, k, options.side),
            chain,
            &global_opts,
        )?;
        lambda = refined.lambda;
        chain = refined.factors;

        // 4. next residual and bookkeeping
        residual = match options.side {
            FactorSide::Right => chain[k + 1].clone(),
            FactorSide::Left => chain[0].clone(),
        };

        let approx = chain_product(ctx, &chain)?.mapv(|v| v.scale(lambda));
        let err = frobenius_norm(&(data - &approx));
        let level = LevelError {
            relative_error: if data_norm > 0.0 { err / data_norm } else { err },
            density: count_nonzero(&chain) as f64 / numel,
        };
        info!(
            level = k,
            lambda,
            relative_error = level.relative_error,
            density = level.density,
            "hierarchical level done"
        );
        errors.push(level);
    }

    Ok(HierarchicalResult {
        lambda,
        factors: chain,
        errors,
    })
}
