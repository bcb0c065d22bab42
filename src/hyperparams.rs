use crate::error::{Result, SsvmError};
use crate::param_guard::ParamGuard;
use crate::qp::AdmmSolver;
use crate::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Which loss ends up in the loss curve
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowLoss {
    /// Mean loss of the loss-augmented outputs, available without extra work
    Augmented,
    /// Mean loss of plain inference, costs one additional inference call per example and
    /// iteration
    True,
}

/// The set of hyperparameters that can be specified for fitting a
/// [1-slack structured SVM](crate::OneSlackSsvm).
///
/// ### Example
///
/// ```rust
/// use linfa_ssvm::prelude::*;
///
/// let params = OneSlackSsvm::<f64, _>::params()
///     .c(10.)
///     .max_iter(500)
///     .positive_constraint(vec![0])
///     .n_jobs(2);
///
/// let checked = params.check_unwrap();
/// assert_eq!(checked.max_iter(), 500);
/// assert_eq!(checked.positive_constraint(), Some(&[0][..]));
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct OneSlackSsvmValidParams<F: Float, S> {
    max_iter: usize,
    c: F,
    check_constraints: bool,
    positive_constraint: Option<Vec<usize>>,
    tol: Option<F>,
    n_jobs: i32,
    break_on_bad: bool,
    show_loss: ShowLoss,
    solver: S,
}

impl<F: Float, S> OneSlackSsvmValidParams<F, S> {
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn c(&self) -> F {
        self.c
    }

    pub fn check_constraints(&self) -> bool {
        self.check_constraints
    }

    pub fn positive_constraint(&self) -> Option<&[usize]> {
        self.positive_constraint.as_deref()
    }

    pub fn tol(&self) -> Option<F> {
        self.tol
    }

    pub fn n_jobs(&self) -> i32 {
        self.n_jobs
    }

    pub fn break_on_bad(&self) -> bool {
        self.break_on_bad
    }

    pub fn show_loss(&self) -> ShowLoss {
        self.show_loss
    }

    pub fn qp_solver(&self) -> &S {
        &self.solver
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct OneSlackSsvmParams<F: Float, S = AdmmSolver<F>>(OneSlackSsvmValidParams<F, S>);

impl<F: Float> Default for OneSlackSsvmParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> OneSlackSsvmParams<F> {
    pub fn new() -> Self {
        Self(OneSlackSsvmValidParams {
            max_iter: 100,
            c: F::one(),
            check_constraints: true,
            positive_constraint: None,
            tol: None,
            n_jobs: 1,
            break_on_bad: false,
            show_loss: ShowLoss::Augmented,
            solver: AdmmSolver::default(),
        })
    }
}

impl<F: Float, S> OneSlackSsvmParams<F, S> {
    /// Set the maximal number of cutting-plane iterations
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Set the regularization constant
    ///
    /// Larger values penalize the shared slack more, the dual variables sum up to this value.
    pub fn c(mut self, c: F) -> Self {
        self.0.c = c;
        self
    }

    /// Compare each new working constraint with all stored ones to detect approximate inference
    pub fn check_constraints(mut self, check_constraints: bool) -> Self {
        self.0.check_constraints = check_constraints;
        self
    }

    /// Force the weights of these features to be non-negative
    pub fn positive_constraint(mut self, features: Vec<usize>) -> Self {
        self.0.positive_constraint = Some(features);
        self
    }

    /// Stop once the dual objective improves by less than `tol` in one iteration
    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = Some(tol);
        self
    }

    /// Number of threads for the search of violated constraints
    ///
    /// `1` runs sequentially, `-1` uses the global rayon pool and any larger value creates a
    /// dedicated pool of that size.
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.0.n_jobs = n_jobs;
        self
    }

    /// Return an error instead of stopping when inference turns out to be inconsistent
    pub fn break_on_bad(mut self, break_on_bad: bool) -> Self {
        self.0.break_on_bad = break_on_bad;
        self
    }

    pub fn show_loss(mut self, show_loss: ShowLoss) -> Self {
        self.0.show_loss = show_loss;
        self
    }

    /// Replace the solver of the dual quadratic program
    pub fn qp_solver<S2>(self, solver: S2) -> OneSlackSsvmParams<F, S2> {
        let p = self.0;
        OneSlackSsvmParams(OneSlackSsvmValidParams {
            max_iter: p.max_iter,
            c: p.c,
            check_constraints: p.check_constraints,
            positive_constraint: p.positive_constraint,
            tol: p.tol,
            n_jobs: p.n_jobs,
            break_on_bad: p.break_on_bad,
            show_loss: p.show_loss,
            solver,
        })
    }
}

impl<F: Float, S> ParamGuard for OneSlackSsvmParams<F, S> {
    type Checked = OneSlackSsvmValidParams<F, S>;
    type Error = SsvmError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let c = self.0.c;
        if !c.is_finite() || c <= F::zero() {
            return Err(SsvmError::InvalidC(c.to_f32().unwrap_or(f32::NAN)));
        }
        if self.0.max_iter == 0 {
            return Err(SsvmError::InvalidMaxIter);
        }
        if let Some(tol) = self.0.tol {
            if !tol.is_finite() || tol <= F::zero() {
                return Err(SsvmError::InvalidTol(tol.to_f32().unwrap_or(f32::NAN)));
            }
        }
        if self.0.n_jobs == 0 || self.0.n_jobs < -1 {
            return Err(SsvmError::InvalidNJobs(self.0.n_jobs));
        }

        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
