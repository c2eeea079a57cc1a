//! **palm4msa**: sparse multi-factor approximation of dense matrices.
//!
//! Approximates a matrix as `X ≈ λ · S_0 · S_1 · … · S_{n-1}` where every
//! factor lives in its own constraint set (sparsity, norm, sign, constant).
//!
//! 1. **Primitives** (`linalg`): chain products, one-sided multiplication by
//!    a factorized matrix, Frobenius / spectral norms.
//! 2. **Projections** (`proxs`): proximal operators of the constraint sets.
//! 3. **Gradients** (`gradients`): factor-wise gradient + Lipschitz modulus,
//!    real and complex.
//! 4. **Optimiser** (`optimizer`): the PALM4MSA alternating loop.
//! 5. **Hierarchical** (`hierarchical`): repeated two-factor splits with
//!    global refinement.
//!
//! Matrix products go through an injected [`Backend`]; [`Cpu`] is the
//! default.
//!
//! ```
//! use ndarray::Array2;
//! use palm4msa::{palm4msa, Constraint, Cpu, PalmOptions};
//!
//! let x = Array2::from_shape_fn((10, 10), |(i, j)| (10 * i + j) as f64);
//! let cons = vec![Constraint::sparse(20, 10, 10), Constraint::sparse(20, 10, 10)];
//! let init = vec![Array2::zeros((10, 10)), Array2::eye(10)];
//! let opts = PalmOptions { n_iter: 50, ..PalmOptions::default() };
//!
//! let out = palm4msa(&Cpu, &x, 2, &cons, init, &opts)?;
//! assert_eq!(out.factors.len(), 2);
//! # Ok::<(), palm4msa::FactorError>(())
//! ```

pub mod types;
pub mod backend;
pub mod linalg;
pub mod proxs;
pub mod gradients;
pub mod optimizer;
pub mod hierarchical;

pub use backend::{Backend, Cpu};
pub use hierarchical::hierarchical;
pub use optimizer::palm4msa;
pub use types::{
    Constraint, ConstraintGrid, ConstraintTag, Entry, FactorError, FactorSide, FactorizedMatrix,
    HierarchicalOptions, HierarchicalResult, LevelError, PalmOptions, PalmResult, UpdateOrder,
};
