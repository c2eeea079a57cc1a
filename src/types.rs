use ndarray::{Array2, LinalgScalar, ScalarOperand};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;
use thiserror::Error;

use crate::backend::Backend;
use crate::linalg;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Every variant describes a caller misconfiguration detected before the
/// optimisation loop starts.  Numerical degeneracy (zero norms, zero
/// Lipschitz moduli) is handled in place and never surfaces here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactorError {
    /// `n_facts` disagrees with the number of initial factors.
    #[error("wrong initialization: n_facts = {n_facts} but {init_facts} initial factors were given")]
    FactorCountMismatch { n_facts: usize, init_facts: usize },

    /// Number of constraints disagrees with the number of factors / levels.
    #[error("expected {expected} constraints, got {found}")]
    ConstraintCountMismatch { expected: usize, found: usize },

    /// An initial factor does not have the shape its constraint declares.
    #[error("initial factor {index} has shape {found:?} but its constraint declares {expected:?}")]
    FactorShape {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Declared constraint shapes do not chain-compose to the data shape.
    #[error("size incompatibility in constraint {index}: {reason}")]
    ConstraintShape { index: usize, reason: String },

    /// Two neighbouring factors cannot be multiplied.
    #[error("factor {index} has {left_cols} columns but its right neighbour has {right_rows} rows")]
    ChainMismatch {
        index: usize,
        left_cols: usize,
        right_rows: usize,
    },

    /// Constraint tag not recognised.
    #[error("unknown constraint kind '{0}'")]
    UnknownConstraint(String),

    /// Constraint tag recognised but not usable here.
    #[error("constraint kind '{0}' is not supported")]
    UnsupportedConstraint(String),

    /// An operand does not have the shape it is combined with.
    #[error("shape {found:?} does not match the expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

// ─────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────

/// Step-size safety margin: the step is `1 / (LIPSCHITZ_SAFETY · L)`.
pub const LIPSCHITZ_SAFETY: f64 = 1.001;

pub const DEFAULT_N_ITER: usize = 500;

// ─────────────────────────────────────────────────────────────
//  Scalar entries  (real and complex)
// ─────────────────────────────────────────────────────────────

/// Matrix entry type.  Implemented for `f64` and `Complex64`.
///
/// For real entries `conj` is the identity, so every routine written with
/// Hermitian transposes reduces to the plain-transpose formula.
pub trait Entry: LinalgScalar + ScalarOperand + Debug + Send + Sync {
    fn from_real(x: f64) -> Self;
    fn conj(self) -> Self;
    fn re(self) -> f64;
    fn im(self) -> f64;
    /// Squared modulus |x|².
    fn norm_sqr(self) -> f64;

    /// Multiply by a real scalar.
    fn scale(self, s: f64) -> Self;

    fn is_finite(self) -> bool {
        self.re().is_finite() && self.im().is_finite()
    }
}

impl Entry for f64 {
    #[inline]
    fn from_real(x: f64) -> Self {
        x
    }
    #[inline]
    fn conj(self) -> Self {
        self
    }
    #[inline]
    fn re(self) -> f64 {
        self
    }
    #[inline]
    fn im(self) -> f64 {
        0.0
    }
    #[inline]
    fn norm_sqr(self) -> f64 {
        self * self
    }
    #[inline]
    fn scale(self, s: f64) -> Self {
        self * s
    }
}

impl Entry for Complex64 {
    #[inline]
    fn from_real(x: f64) -> Self {
        Complex64::new(x, 0.0)
    }
    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }
    #[inline]
    fn re(self) -> f64 {
        self.re
    }
    #[inline]
    fn im(self) -> f64 {
        self.im
    }
    #[inline]
    fn norm_sqr(self) -> f64 {
        Complex64::norm_sqr(&self)
    }
    #[inline]
    fn scale(self, s: f64) -> Self {
        self * s
    }
}

// ─────────────────────────────────────────────────────────────
//  Constraints
// ─────────────────────────────────────────────────────────────

/// Constraint set a single factor is projected onto after each gradient step.
///
/// Every variant except `Constant` carries the declared `(rows, cols)` of the
/// factor it governs; a constant factor's shape is the shape of its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint<T> {
    /// At most `nnz` non-zeros in the whole matrix, unit Frobenius norm.
    Sparse { nnz: usize, shape: (usize, usize) },
    /// At most `nnz` non-zeros per column, unit Frobenius norm.
    SparseCols { nnz: usize, shape: (usize, usize) },
    /// At most `nnz` non-zeros per row, unit Frobenius norm.
    SparseRows { nnz: usize, shape: (usize, usize) },
    /// Every column of Euclidean norm `norm`.
    NormCols { norm: f64, shape: (usize, usize) },
    /// Every row of Euclidean norm `norm`.
    NormRows { norm: f64, shape: (usize, usize) },
    /// Non-negative entries, unit Frobenius norm.
    Positive { shape: (usize, usize) },
    /// Non-negative with at most `nnz` non-zeros, unit Frobenius norm.
    SparsePositive { nnz: usize, shape: (usize, usize) },
    /// Frozen factor: the projection always returns `value`.
    Constant { value: Array2<T> },
}

impl<T: Entry> Constraint<T> {
    pub fn sparse(nnz: usize, rows: usize, cols: usize) -> Self {
        Self::Sparse { nnz, shape: (rows, cols) }
    }

    pub fn sparse_cols(nnz: usize, rows: usize, cols: usize) -> Self {
        Self::SparseCols { nnz, shape: (rows, cols) }
    }

    pub fn sparse_rows(nnz: usize, rows: usize, cols: usize) -> Self {
        Self::SparseRows { nnz, shape: (rows, cols) }
    }

    pub fn norm_cols(norm: f64, rows: usize, cols: usize) -> Self {
        Self::NormCols { norm, shape: (rows, cols) }
    }

    pub fn norm_rows(norm: f64, rows: usize, cols: usize) -> Self {
        Self::NormRows { norm, shape: (rows, cols) }
    }

    pub fn positive(rows: usize, cols: usize) -> Self {
        Self::Positive { shape: (rows, cols) }
    }

    pub fn sparse_positive(nnz: usize, rows: usize, cols: usize) -> Self {
        Self::SparsePositive { nnz, shape: (rows, cols) }
    }

    pub fn constant(value: Array2<T>) -> Self {
        Self::Constant { value }
    }

    /// Declared `(rows, cols)` of the governed factor.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Sparse { shape, .. }
            | Self::SparseCols { shape, .. }
            | Self::SparseRows { shape, .. }
            | Self::NormCols { shape, .. }
            | Self::NormRows { shape, .. }
            | Self::Positive { shape }
            | Self::SparsePositive { shape, .. } => *shape,
            Self::Constant { value } => value.dim(),
        }
    }

    pub fn tag(&self) -> ConstraintTag {
        match self {
            Self::Sparse { .. } => ConstraintTag::Sp,
            Self::SparseCols { .. } => ConstraintTag::SpCol,
            Self::SparseRows { .. } => ConstraintTag::SpLin,
            Self::NormCols { .. } => ConstraintTag::NormCol,
            Self::NormRows { .. } => ConstraintTag::NormLin,
            Self::Positive { .. } => ConstraintTag::Pos,
            Self::SparsePositive { .. } => ConstraintTag::SpPos,
            Self::Constant { .. } => ConstraintTag::Const,
        }
    }

    /// Build a descriptor from a `{name, parameter, rows, cols}` quadruple.
    ///
    /// Sparsity budgets are rounded to the nearest integer.  `const` cannot
    /// be expressed with a scalar parameter: use [`Constraint::constant`].
    pub fn from_tag(tag: &str, parameter: f64, rows: usize, cols: usize) -> Result<Self, FactorError> {
        let kind: ConstraintTag = tag.parse()?;
        if !parameter.is_finite() || parameter < 0.0 {
            return Err(FactorError::InvalidParameter(format!(
                "constraint '{kind}' needs a finite non-negative parameter, got {parameter}"
            )));
        }
        let nnz = parameter.round() as usize;
        match kind {
            ConstraintTag::Sp => Ok(Self::sparse(nnz, rows, cols)),
            ConstraintTag::SpCol => Ok(Self::sparse_cols(nnz, rows, cols)),
            ConstraintTag::SpLin => Ok(Self::sparse_rows(nnz, rows, cols)),
            ConstraintTag::NormCol => Ok(Self::norm_cols(parameter, rows, cols)),
            ConstraintTag::NormLin => Ok(Self::norm_rows(parameter, rows, cols)),
            ConstraintTag::Pos => Ok(Self::positive(rows, cols)),
            ConstraintTag::SpPos => Ok(Self::sparse_positive(nnz, rows, cols)),
            ConstraintTag::Const | ConstraintTag::L0Pen | ConstraintTag::L1Pen => {
                Err(FactorError::UnsupportedConstraint(kind.to_string()))
            }
        }
    }
}

/// Short names of the constraint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintTag {
    Sp,
    SpCol,
    SpLin,
    NormCol,
    NormLin,
    Pos,
    SpPos,
    Const,
    /// Penalty kinds: recognised, never implemented.
    L0Pen,
    L1Pen,
}

impl ConstraintTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sp => "sp",
            Self::SpCol => "spcol",
            Self::SpLin => "splin",
            Self::NormCol => "normcol",
            Self::NormLin => "normlin",
            Self::Pos => "pos",
            Self::SpPos => "sppos",
            Self::Const => "const",
            Self::L0Pen => "l0pen",
            Self::L1Pen => "l1pen",
        }
    }
}

impl fmt::Display for ConstraintTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConstraintTag {
    type Err = FactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sp" => Ok(Self::Sp),
            "spcol" => Ok(Self::SpCol),
            "splin" => Ok(Self::SpLin),
            "normcol" => Ok(Self::NormCol),
            "normlin" => Ok(Self::NormLin),
            "pos" => Ok(Self::Pos),
            "sppos" => Ok(Self::SpPos),
            "const" => Ok(Self::Const),
            "l0pen" => Ok(Self::L0Pen),
            "l1pen" => Ok(Self::L1Pen),
            other => Err(FactorError::UnknownConstraint(other.to_string())),
        }
    }
}

/// 2 × (n_facts − 1) grid of constraints for the hierarchical driver.
///
/// `left[k]` / `right[k]` govern the left / right factor produced by the
/// two-factor split at level `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintGrid<T> {
    pub left: Vec<Constraint<T>>,
    pub right: Vec<Constraint<T>>,
}

impl<T: Entry> ConstraintGrid<T> {
    pub fn new(left: Vec<Constraint<T>>, right: Vec<Constraint<T>>) -> Self {
        Self { left, right }
    }

    /// Same `(left, right)` pair at every level.
    pub fn uniform(levels: usize, left: Constraint<T>, right: Constraint<T>) -> Self {
        Self {
            left: vec![left; levels],
            right: vec![right; levels],
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Solver options
// ─────────────────────────────────────────────────────────────

/// Order in which the factors are visited within one PALM iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOrder {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl UpdateOrder {
    /// Factor indices in visiting order.
    pub fn sequence(self, n_facts: usize) -> Vec<usize> {
        match self {
            Self::LeftToRight => (0..n_facts).collect(),
            Self::RightToLeft => (0..n_facts).rev().collect(),
        }
    }
}

/// Side of the chain the hierarchical driver keeps splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactorSide {
    /// Split the leftmost factor: new factors are prepended.
    Left,
    /// Split the rightmost factor: new factors are appended.
    #[default]
    Right,
}

#[derive(Debug, Clone)]
pub struct PalmOptions {
    pub n_iter: usize,
    pub init_lambda: f64,
    /// Compute, log and record the RMSE after every iteration.
    pub verbose: bool,
    pub update_order: UpdateOrder,
}

impl Default for PalmOptions {
    fn default() -> Self {
        Self {
            n_iter: DEFAULT_N_ITER,
            init_lambda: 1.0,
            verbose: false,
            update_order: UpdateOrder::LeftToRight,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchicalOptions {
    /// Iterations of each two-factor split.
    pub n_iter_split: usize,
    /// Iterations of each global refinement.
    pub n_iter_global: usize,
    pub verbose: bool,
    pub update_order: UpdateOrder,
    pub side: FactorSide,
}

impl Default for HierarchicalOptions {
    fn default() -> Self {
        Self {
            n_iter_split: DEFAULT_N_ITER,
            n_iter_global: DEFAULT_N_ITER,
            verbose: false,
            update_order: UpdateOrder::LeftToRight,
            side: FactorSide::Right,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Results
// ─────────────────────────────────────────────────────────────

/// Output of one PALM4MSA run.
#[derive(Debug, Clone)]
pub struct PalmResult<T> {
    pub lambda: f64,
    pub factors: Vec<Array2<T>>,
    /// One RMSE per iteration when running verbose, empty otherwise.
    pub rmse_trace: Vec<f64>,
}

impl<T: Entry> PalmResult<T> {
    pub fn into_factorized(self) -> FactorizedMatrix<T> {
        FactorizedMatrix::new(self.lambda, self.factors)
    }
}

/// Bookkeeping recorded after each hierarchical level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelError {
    /// ‖X − λ·chain‖_F / ‖X‖_F
    pub relative_error: f64,
    /// Total non-zeros of all factors divided by the number of entries of X.
    pub density: f64,
}

/// Output of the hierarchical driver.
#[derive(Debug, Clone)]
pub struct HierarchicalResult<T> {
    pub lambda: f64,
    pub factors: Vec<Array2<T>>,
    /// One entry per split level (`n_facts − 1` entries).
    pub errors: Vec<LevelError>,
}

impl<T: Entry> HierarchicalResult<T> {
    pub fn into_factorized(self) -> FactorizedMatrix<T> {
        FactorizedMatrix::new(self.lambda, self.factors)
    }
}

// ─────────────────────────────────────────────────────────────
//  Factorized matrix  (λ · S_0 · S_1 · … · S_{n-1})
// ─────────────────────────────────────────────────────────────

/// A matrix held in factorized form.
#[derive(Debug, Clone)]
pub struct FactorizedMatrix<T> {
    pub lambda: f64,
    pub factors: Vec<Array2<T>>,
}

impl<T: Entry> FactorizedMatrix<T> {
    pub fn new(lambda: f64, factors: Vec<Array2<T>>) -> Self {
        Self { lambda, factors }
    }

    /// `(rows, cols)` of the represented matrix.
    pub fn dim(&self) -> (usize, usize) {
        match (self.factors.first(), self.factors.last()) {
            (Some(first), Some(last)) => (first.nrows(), last.ncols()),
            _ => (1, 1),
        }
    }

    /// Dense `λ · chain`.
    pub fn develop<B: Backend>(&self, ctx: &B) -> Result<Array2<T>, FactorError> {
        let lambda = self.lambda;
        Ok(linalg::chain_product(ctx, &self.factors)?.mapv(|v| v.scale(lambda)))
    }

    /// ‖X − λ·chain‖_F / ‖X‖_F  (absolute error when X is zero).
    pub fn relative_error<B: Backend>(&self, ctx: &B, data: &Array2<T>) -> Result<f64, FactorError> {
        let approx = self.develop(ctx)?;
        if approx.dim() != data.dim() {
            return Err(FactorError::ShapeMismatch {
                expected: approx.dim(),
                found: data.dim(),
            });
        }
        let err = linalg::frobenius_norm(&(data - &approx));
        let norm = linalg::frobenius_norm(data);
        Ok(if norm > 0.0 { err / norm } else { err })
    }

    pub fn nnz(&self) -> usize {
        linalg::count_nonzero(&self.factors)
    }

    /// Non-zeros of the factors relative to the dense size.
    pub fn density(&self) -> f64 {
        let (rows, cols) = self.dim();
        self.nnz() as f64 / (rows * cols) as f64
    }

    /// Relative complexity gain: dense size over factor non-zeros.
    pub fn rcg(&self) -> f64 {
        let (rows, cols) = self.dim();
        (rows * cols) as f64 / self.nnz() as f64
    }

    /// `λ · chain · x` evaluated right-to-left, never forming the chain.
    pub fn apply<B: Backend>(&self, ctx: &B, x: &Array2<T>) -> Result<Array2<T>, FactorError> {
        let lambda = self.lambda;
        Ok(linalg::multiply_left(ctx, &self.factors, x)?.mapv(|v| v.scale(lambda)))
    }

    /// Factors in compressed sparse row form (λ is not folded in).
    pub fn to_sparse(&self) -> Vec<CsMat<T>> {
        self.factors
            .iter()
            .map(|f| {
                let mut tri: TriMat<T> = TriMat::new(f.dim());
                for ((i, j), &v) in f.indexed_iter() {
                    if !v.is_zero() {
                        tri.add_triplet(i, j, v);
                    }
                }
                tri.to_csr()
            })
            .collect()
    }
}
