//! Gradient and Lipschitz modulus of the factor-wise data-fit term.
//!
//! For the factor `S` sitting between the chains `L` and `R`:
//!
//!   H(S)   = ½ ‖X − λ·L·S·R‖²_F
//!   ∇H(S)  = λ · Lᴴ (λ·L·S·R − X) Rᴴ
//!   Lip    = λ² · ‖L‖₂² · ‖R‖₂²
//!
//! Two evaluation strategies give the same numbers:
//!   * `gradient` applies the chains factor by factor (`multiply_left` /
//!     `multiply_right`), never developing them for the residual.
//!   * `gradient_developed` develops `L` and `R` first.  This is the path
//!     taken for complex data.

use ndarray::Array2;

use crate::backend::Backend;
use crate::linalg::{chain_product, hermitian, multiply_left, multiply_right, spectral_norm};
use crate::types::{Entry, FactorError};

/// Gradient with respect to one factor plus the step-size denominator.
#[derive(Debug, Clone)]
pub struct Gradient<T> {
    pub grad: Array2<T>,
    pub lipschitz: f64,
}

// ─────────────────────────────────────────────────────────────
//  Lipschitz modulus
// ─────────────────────────────────────────────────────────────

/// `λ² · ‖chain(L)‖₂² · ‖chain(R)‖₂²`.  Empty chains contribute 1.
pub fn lipschitz_modulus<T: Entry, B: Backend>(
    ctx: &B,
    left: &[Array2<T>],
    right: &[Array2<T>],
    lambda: f64,
) -> Result<f64, FactorError> {
    let l_norm = spectral_norm(&chain_product(ctx, left)?);
    let r_norm = spectral_norm(&chain_product(ctx, right)?);
    Ok(lambda * lambda * r_norm * r_norm * l_norm * l_norm)
}

/// `λ·L·S·R − X`, provided the chain lands on the data shape.
fn residual<T: Entry>(approx: &Array2<T>, data: &Array2<T>) -> Result<Array2<T>, FactorError> {
    if approx.dim() != data.dim() {
        return Err(FactorError::ShapeMismatch {
            expected: approx.dim(),
            found: data.dim(),
        });
    }
    Ok(approx - data)
}

// ─────────────────────────────────────────────────────────────
//  Factored path
// ─────────────────────────────────────────────────────────────

/// Gradient evaluated by applying the chains one factor at a time.
pub fn gradient<T: Entry, B: Backend>(
    ctx: &B,
    left: &[Array2<T>],
    middle: &Array2<T>,
    right: &[Array2<T>],
    data: &Array2<T>,
    lambda: f64,
) -> Result<Gradient<T>, FactorError> {
    // λ·L·S·R − X
    let approx = multiply_right(ctx, &multiply_left(ctx, left, middle)?, right)?.mapv(|v| v.scale(lambda));
    let residual = residual(&approx, data)?;

    // R · (residualᴴ · L), then one Hermitian transpose at the end
    let projected = multiply_right(ctx, &hermitian(&residual), left)?;
    let projected = multiply_left(ctx, right, &projected)?;
    let grad = hermitian(&projected).mapv(|v| v.scale(lambda));

    let lipschitz = lipschitz_modulus(ctx, left, right, lambda)?;
    Ok(Gradient { grad, lipschitz })
}

// ─────────────────────────────────────────────────────────────
//  Developed path
// ─────────────────────────────────────────────────────────────

/// Develop a chain, or `None` for the empty chain (identity).
fn develop<T: Entry, B: Backend>(ctx: &B, factors: &[Array2<T>]) -> Result<Option<Array2<T>>, FactorError> {
    if factors.is_empty() {
        Ok(None)
    } else {
        chain_product(ctx, factors).map(Some)
    }
}

fn as_chain<T>(m: &Option<Array2<T>>) -> &[Array2<T>] {
    match m {
        Some(m) => std::slice::from_ref(m),
        None => &[],
    }
}

/// Gradient evaluated from the developed chains.
pub fn gradient_developed<T: Entry, B: Backend>(
    ctx: &B,
    left: &[Array2<T>],
    middle: &Array2<T>,
    right: &[Array2<T>],
    data: &Array2<T>,
    lambda: f64,
) -> Result<Gradient<T>, FactorError> {
    let l = develop(ctx, left)?;
    let r = develop(ctx, right)?;

    let lsr = multiply_right(ctx, &multiply_left(ctx, as_chain(&l), middle)?, as_chain(&r))?;
    let residual = residual(&lsr.mapv(|v| v.scale(lambda)), data)?;

    let lh = l.as_ref().map(hermitian);
    let rh = r.as_ref().map(hermitian);
    let grad = multiply_right(ctx, &multiply_left(ctx, as_chain(&lh), &residual)?, as_chain(&rh))?;
    let grad = grad.mapv(|v| v.scale(lambda));

    let l_norm = l.as_ref().map_or(1.0, spectral_norm);
    let r_norm = r.as_ref().map_or(1.0, spectral_norm);
    let lipschitz = lambda * lambda * r_norm * r_norm * l_norm * l_norm;

    Ok(Gradient { grad, lipschitz })
}
