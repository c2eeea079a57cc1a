//! Execution context for the dense kernels.
//!
//! The algorithms only need matrix products from the context; norms, sorts
//! and projections are cheap elementwise passes done on the host.  The
//! context decides where and how the products run.

use ndarray::{Array2, ArrayView2};
use std::fmt::Debug;

use crate::types::Entry;

/// Supplies matrix multiplication to the factorization routines.
pub trait Backend: Debug + Send + Sync {
    /// Short label used in log records.
    fn name(&self) -> &'static str;

    /// Dense product `a · b`.
    ///
    /// # Panics
    /// If `a.ncols() != b.nrows()`.  Callers validate shapes up front.
    fn matmul<T: Entry>(&self, a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T>;
}

/// Host CPU via ndarray's GEMM (matrixmultiply).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cpu;

impl Backend for Cpu {
    fn name(&self) -> &'static str {
        "cpu"
    }

    #[inline]
    fn matmul<T: Entry>(&self, a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T> {
        a.dot(b)
    }
}
