//! PALM4MSA: proximal alternating linearized minimization over a chain of
//! constrained factors.
//!
//! Each iteration visits every factor once (Gauss-Seidel order), takes one
//! gradient step of size `1 / (1.001 · Lip)` with the other factors frozen,
//! projects the result onto the factor's constraint set, and finally updates
//! λ in closed form.  The iteration budget is fixed; there is no tolerance
//! test.

use ndarray::Array2;
use tracing::{debug, info, trace};

use crate::backend::Backend;
use crate::gradients::{gradient, gradient_developed, Gradient};
use crate::linalg::{chain_product, frobenius_norm, inner_product_re};
use crate::types::{
    Constraint, Entry, FactorError, PalmOptions, PalmResult, LIPSCHITZ_SAFETY,
};

// ─────────────────────────────────────────────────────────────
//  Input validation  (runs before any tensor work)
// ─────────────────────────────────────────────────────────────

/// Check that constraint shapes chain from `data.rows` to `data.cols`.
pub fn check_constraint_chain<T: Entry>(
    data_dim: (usize, usize),
    constraints: &[Constraint<T>],
) -> Result<(), FactorError> {
    let (rows, cols) = data_dim;
    let Some(first) = constraints.first() else {
        return Ok(());
    };
    if first.shape().0 != rows {
        return Err(FactorError::ConstraintShape {
            index: 0,
            reason: format!("declares {} rows but the data has {rows}", first.shape().0),
        });
    }
    for (i, pair) in constraints.windows(2).enumerate() {
        let (left, right) = (pair[0].shape(), pair[1].shape());
        if left.1 != right.0 {
            return Err(FactorError::ConstraintShape {
                index: i + 1,
                reason: format!("declares {} rows but constraint {i} has {} columns", right.0, left.1),
            });
        }
    }
    let last = constraints.len() - 1;
    let last_cols = constraints[last].shape().1;
    if last_cols != cols {
        return Err(FactorError::ConstraintShape {
            index: last,
            reason: format!("declares {last_cols} columns but the data has {cols}"),
        });
    }
    Ok(())
}

fn validate<T: Entry>(
    data: &Array2<T>,
    n_facts: usize,
    constraints: &[Constraint<T>],
    init_facts: &[Array2<T>],
    options: &PalmOptions,
) -> Result<(), FactorError> {
    if n_facts != init_facts.len() {
        return Err(FactorError::FactorCountMismatch {
            n_facts,
            init_facts: init_facts.len(),
        });
    }
    if constraints.len() != n_facts {
        return Err(FactorError::ConstraintCountMismatch {
            expected: n_facts,
            found: constraints.len(),
        });
    }
    if n_facts == 0 {
        return Err(FactorError::InvalidParameter("n_facts must be at least 1".into()));
    }
    if data.is_empty() {
        return Err(FactorError::InvalidParameter("data matrix is empty".into()));
    }
    if !options.init_lambda.is_finite() {
        return Err(FactorError::InvalidParameter(format!(
            "init_lambda must be finite, got {}",
            options.init_lambda
        )));
    }
    for (index, (c, f)) in constraints.iter().zip(init_facts).enumerate() {
        if c.shape() != f.dim() {
            return Err(FactorError::FactorShape {
                index,
                expected: c.shape(),
                found: f.dim(),
            });
        }
    }
    check_constraint_chain(data.dim(), constraints)
}

// ─────────────────────────────────────────────────────────────
//  Closed-form λ
// ─────────────────────────────────────────────────────────────

/// `argmin_λ ‖X − λ·D‖_F = Re tr(Xᴴ D) / tr(Dᴴ D)`.
///
/// `None` when `D` is zero (any λ is optimal).
pub fn optimal_lambda<T: Entry>(data: &Array2<T>, developed: &Array2<T>) -> Option<f64> {
    let denom = developed.iter().map(|v| v.norm_sqr()).sum::<f64>();
    if denom > 0.0 && denom.is_finite() {
        Some(inner_product_re(developed, data) / denom)
    } else {
        None
    }
}

/// `‖X − λ·D‖_F / sqrt(numel)`.
pub fn rmse<T: Entry>(data: &Array2<T>, developed: &Array2<T>, lambda: f64) -> f64 {
    let approx = developed.mapv(|v| v.scale(lambda));
    frobenius_norm(&(data - &approx)) / (data.len() as f64).sqrt()
}

// ─────────────────────────────────────────────────────────────
//  Single factor update
// ─────────────────────────────────────────────────────────────

fn update_factor<T: Entry, B: Backend>(
    ctx: &B,
    data: &Array2<T>,
    facts: &[Array2<T>],
    j: usize,
    constraint: &Constraint<T>,
    lambda: f64,
    developed_path: bool,
) -> Result<Array2<T>, FactorError> {
    if let Constraint::Constant { value } = constraint {
        return Ok(value.clone());
    }

    let (left, rest) = facts.split_at(j);
    let (middle, right) = (&rest[0], &rest[1..]);

    let Gradient { grad, lipschitz } = if developed_path {
        gradient_developed(ctx, left, middle, right, data, lambda)?
    } else {
        gradient(ctx, left, middle, right, data, lambda)?
    };

    let stepped = if lipschitz > 0.0 && lipschitz.is_finite() {
        let step = 1.0 / (LIPSCHITZ_SAFETY * lipschitz);
        middle - &grad.mapv(|g| g.scale(step))
    } else {
        trace!(factor = j, lipschitz, "degenerate Lipschitz modulus, step skipped");
        middle.clone()
    };

    Ok(constraint.project(&stepped))
}

// ─────────────────────────────────────────────────────────────
//  Top-level entry point
// ─────────────────────────────────────────────────────────────

/// Factorize `data ≈ λ · S_0 · … · S_{n-1}` with PALM4MSA.
///
/// `constraints[j]` governs `init_facts[j]`; both lists must have `n_facts`
/// entries and the shapes must chain from `data.nrows()` to `data.ncols()`.
/// All checks run before the first iteration, so a misconfigured call
/// returns an error without doing any matrix work.
///
/// Runs exactly `options.n_iter` iterations.
pub fn palm4msa<T: Entry, B: Backend>(
    ctx: &B,
    data: &Array2<T>,
    n_facts: usize,
    constraints: &[Constraint<T>],
    init_facts: Vec<Array2<T>>,
    options: &PalmOptions,
) -> Result<PalmResult<T>, FactorError> {
    validate(data, n_facts, constraints, &init_facts, options)?;

    let developed_path = data.iter().any(|v| v.im() != 0.0);
    let order = options.update_order.sequence(n_facts);
    let mut facts = init_facts;
    let mut lambda = options.init_lambda;
    let mut rmse_trace = Vec::new();

    debug!(
        backend = ctx.name(),
        n_facts,
        n_iter = options.n_iter,
        complex = developed_path,
        "palm4msa start"
    );

    for iter in 0..options.n_iter {
        for &j in &order {
            facts[j] = update_factor(ctx, data, &facts, j, &constraints[j], lambda, developed_path)?;
        }

        let developed = chain_product(ctx, &facts)?;
        match optimal_lambda(data, &developed) {
            Some(l) => lambda = l,
            None => trace!(iter, "factor chain vanished, lambda kept"),
        }

        if options.verbose {
            let err = rmse(data, &developed, lambda);
            info!(iter, rmse = err, lambda, "palm4msa");
            rmse_trace.push(err);
        } else {
            trace!(iter, lambda, "palm4msa iteration");
        }
    }

    debug!(lambda, "palm4msa done");

    Ok(PalmResult {
        lambda,
        factors: facts,
        rmse_trace,
    })
}
