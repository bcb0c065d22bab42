//! # Structured Support Vector Machines
//!
//! `linfa-ssvm` learns the weights of a structured-output SVM. The outputs of such a model are
//! not single labels but labelings with internal structure, like sequences, segmentations or
//! graphs. A [`StructuredProblem`](problem::StructuredProblem) describes the joint feature map
//! `psi(x, y)`, the task loss and how to find the highest scoring output. The learner then seeks
//! a weight vector `w` for which the true output of each training example scores higher than any
//! other output by a margin of at least the task loss.
//!
//! ## The 1-slack cutting-plane method
//!
//! Enumerating every margin constraint is hopeless, their number grows exponentially with the
//! size of the outputs. The cutting-plane method instead starts with an empty working set and
//! repeats:
//!
//! 1. Run loss-augmented inference on every example with the current weights and collect the
//!    most violating outputs. This step runs in parallel, see
//!    [`n_jobs`](OneSlackSsvmParams::n_jobs).
//! 2. Average the feature differences and losses into a single working constraint. All examples
//!    share one slack variable, hence "1-slack".
//! 3. Stop if the constraint is already satisfied, repeats an earlier one or indicates that the
//!    inference is only approximate.
//! 4. Otherwise add it to the working set and re-solve the dual quadratic program over all
//!    working constraints, which gives the new weights.
//!
//! The dual is solved from scratch in every iteration with a [`QpSolver`](qp::QpSolver). The
//! default is [`AdmmSolver`](qp::AdmmSolver), a dense operator-splitting solver.
//!
//! ## Example
//!
//! ```
//! use linfa_ssvm::prelude::*;
//! use ndarray::array;
//!
//! let records = vec![
//!     array![1.0, 0.0, 1.0],
//!     array![0.9, 0.1, 1.0],
//!     array![0.0, 1.0, 1.0],
//!     array![0.1, 0.9, 1.0],
//! ];
//! let targets = vec![0, 0, 1, 1];
//!
//! let problem = MultiClassProblem::new(3, 2);
//! let model = OneSlackSsvm::params()
//!     .c(10.0)
//!     .fit(&problem, &records, &targets)
//!     .unwrap();
//!
//! assert_eq!(model.predict(&problem, &records), targets);
//! ```
use ndarray::{Array1, NdFloat};
use num_traits::NumCast;

use std::fmt;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod algorithm;
pub mod checker;
pub mod constraint;
pub mod dual;
pub mod error;
mod executor;
pub mod hyperparams;
pub mod multiclass;
pub mod param_guard;
pub mod prelude;
pub mod problem;
pub mod qp;
pub mod traits;

pub use constraint::{ConstraintStore, WorkingConstraint};
pub use dual::DualSolution;
pub use error::{Result, SsvmError};
pub use multiclass::MultiClassProblem;
pub use hyperparams::{OneSlackSsvmParams, OneSlackSsvmValidParams, ShowLoss};
pub use param_guard::ParamGuard;

/// An extension of the NdArray float type
pub trait Float: NdFloat + Default + std::iter::Sum {
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}
impl Float for f64 {}

/// Reason for stopping
///
/// The cutting-plane loop either runs out of new constraints, hits the iteration limit or, when
/// a tolerance is set, sees the dual objective stall.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The last working constraint was rejected by the checker
    Converged,
    /// The objective improved less than the tolerance between two iterations
    ObjectiveConverged,
    MaxIterReached,
}

/// Fitted 1-slack structured SVM
///
/// Holds the learned weights together with the working constraints and dual solutions they were
/// derived from. The working constraints can be passed to
/// [`fit_with`](traits::FitWith::fit_with) to warm start another training run.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct OneSlackSsvm<F: Float, Y> {
    w: Array1<F>,
    constraints: ConstraintStore<F, Y>,
    dual: Option<DualSolution<F>>,
    alphas: Vec<Array1<F>>,
    loss_curve: Vec<F>,
    objective_curve: Vec<F>,
    exit_reason: ExitReason,
    iterations: usize,
    inference_calls: usize,
}

impl<F: Float> OneSlackSsvm<F, ()> {
    /// Create default hyperparameters
    ///
    /// * `max_iter = 100`
    /// * `c = 1.0`
    /// * `check_constraints = true`
    /// * no positive constraints and no tolerance
    /// * `n_jobs = 1`
    /// * `break_on_bad = false`
    /// * `show_loss = ShowLoss::Augmented`
    /// * the ADMM solver with default parameters
    // Violates the convention that new should return a value of type `Self`
    #[allow(clippy::new_ret_no_self)]
    pub fn params() -> OneSlackSsvmParams<F> {
        OneSlackSsvmParams::new()
    }
}

impl<F: Float, Y> fmt::Display for OneSlackSsvm<F, Y> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objective = self.objective().unwrap_or_else(F::zero);
        match self.exit_reason {
            ExitReason::Converged => write!(
                f,
                "Converged after {} iterations with obj = {} and {} support vectors out of {} constraints",
                self.iterations,
                objective,
                self.nsupport(),
                self.constraints.len()
            ),
            ExitReason::ObjectiveConverged => write!(
                f,
                "Objective stalled after {} iterations with obj = {} and {} support vectors out of {} constraints",
                self.iterations,
                objective,
                self.nsupport(),
                self.constraints.len()
            ),
            ExitReason::MaxIterReached => write!(
                f,
                "Reached maximal iterations {} with obj = {} and {} support vectors out of {} constraints",
                self.iterations,
                objective,
                self.nsupport(),
                self.constraints.len()
            ),
        }
    }
}
