//! Convex quadratic programs
//!
//! The learner only talks to a [`QpSolver`], which solves
//!
//! ```text
//! min_x  x^T P x / 2 + q^T x
//! s.t.   G x <= h
//!        A x  = b
//! ```
//!
//! for a positive semi-definite `P`. [`AdmmSolver`] is the default implementation.
use crate::Float;
use ndarray::{Array1, Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod admm;
mod cholesky;

pub use admm::{AdmmSolver, SolverParams};

/// A dense quadratic program
#[derive(Debug, Clone, PartialEq)]
pub struct QpProblem<F> {
    pub p: Array2<F>,
    pub q: Array1<F>,
    pub g: Array2<F>,
    pub h: Array1<F>,
    pub a: Array2<F>,
    pub b: Array1<F>,
}

impl<F: Float> QpProblem<F> {
    /// Create a new problem
    ///
    /// # Panics
    ///
    /// If the shapes of the matrices and vectors do not agree
    pub fn new(
        p: Array2<F>,
        q: Array1<F>,
        g: Array2<F>,
        h: Array1<F>,
        a: Array2<F>,
        b: Array1<F>,
    ) -> Self {
        let n = q.len();
        assert_eq!(p.dim(), (n, n), "P must be a square matrix matching q");
        assert_eq!(g.ncols(), n, "G must have one column per variable");
        assert_eq!(g.nrows(), h.len(), "G and h must have the same number of rows");
        assert_eq!(a.ncols(), n, "A must have one column per variable");
        assert_eq!(a.nrows(), b.len(), "A and b must have the same number of rows");

        QpProblem { p, q, g, h, a, b }
    }

    pub fn nvariables(&self) -> usize {
        self.q.len()
    }

    /// Value of `x^T P x / 2 + q^T x`
    pub fn objective(&self, x: ArrayView1<F>) -> F {
        x.dot(&self.p.dot(&x)) / F::cast(2.0) + self.q.dot(&x)
    }
}

/// Outcome of a solver run
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    Optimal,
    /// The tolerances were not reached in the iteration budget
    MaxIterations,
    /// Singular system or non-finite iterate
    NumericalError,
}

impl QpStatus {
    pub fn is_optimal(&self) -> bool {
        *self == QpStatus::Optimal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution<F> {
    pub status: QpStatus,
    pub x: Array1<F>,
    /// Value of the minimized objective at `x`
    pub objective: F,
    pub iterations: usize,
}

/// Solver of dense convex quadratic programs
pub trait QpSolver<F: Float> {
    fn solve_qp(&self, problem: &QpProblem<F>) -> QpSolution<F>;
}

impl<'a, F: Float, S: QpSolver<F>> QpSolver<F> for &'a S {
    fn solve_qp(&self, problem: &QpProblem<F>) -> QpSolution<F> {
        (**self).solve_qp(problem)
    }
}
