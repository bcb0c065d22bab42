//! Dual quadratic program of the 1-slack formulation
//!
//! Every working constraint contributes one dual variable. The dual reads
//!
//! ```text
//! max_alpha  loss^T alpha - alpha^T Psi Psi^T alpha / 2
//! s.t.       alpha >= 0
//!            sum(alpha) = C
//!            (Psi^T alpha)_j >= 0    for every positive constrained feature j
//! ```
//!
//! where row `i` of `Psi` is the mean feature difference of constraint `i`. The weights follow as
//! `w = Psi^T alpha`.
use crate::constraint::ConstraintStore;
use crate::error::{Result, SsvmError};
use crate::qp::{QpProblem, QpSolver};
use crate::Float;
use ndarray::{s, Array1, Array2, ArrayView1};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Diagonal added to the kernel matrix when the first solve fails
pub const QP_REGULARIZATION: f64 = 1e-8;
/// Dual variables above this value mark support vectors
pub const SUPPORT_THRESHOLD: f64 = 1e-10;

/// Solution of the dual problem
///
/// Contains one multiplier per working constraint and the weights derived from them.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct DualSolution<F: Float> {
    alpha: Array1<F>,
    w: Array1<F>,
    objective: F,
    nsupport: usize,
}

impl<F: Float> DualSolution<F> {
    pub fn alpha(&self) -> ArrayView1<F> {
        self.alpha.view()
    }

    pub fn w(&self) -> ArrayView1<F> {
        self.w.view()
    }

    /// Value of the dual objective
    pub fn objective(&self) -> F {
        self.objective
    }

    /// Number of constraints with a multiplier above [`SUPPORT_THRESHOLD`]
    pub fn nsupport(&self) -> usize {
        self.nsupport
    }
}

/// Assemble the dual as a minimization problem
fn dual_problem<F: Float>(
    psi: &Array2<F>,
    kernel: Array2<F>,
    losses: &Array1<F>,
    c: F,
    positive_constraint: &[usize],
) -> QpProblem<F> {
    let nconstraints = psi.nrows();
    let nineq = nconstraints + positive_constraint.len();

    // alpha >= 0 and w_j = (Psi^T alpha)_j >= 0
    let mut g = Array2::zeros((nineq, nconstraints));
    g.slice_mut(s![..nconstraints, ..])
        .assign(&(-Array2::<F>::eye(nconstraints)));
    for (k, &j) in positive_constraint.iter().enumerate() {
        g.row_mut(nconstraints + k)
            .assign(&psi.column(j).mapv(|v| -v));
    }

    QpProblem::new(
        kernel,
        losses.mapv(|l| -l),
        g,
        Array1::zeros(nineq),
        Array2::ones((1, nconstraints)),
        Array1::from_elem(1, c),
    )
}

/// Solve the dual over all working constraints and derive the new weights
///
/// A failed solve is retried once with a slightly regularized kernel matrix. If this fails as
/// well, [`SsvmError::SolverFailure`] is returned.
///
/// This function is public and can be called without going through `fit`, so it checks the
/// positive constrained features on its own and returns
/// [`SsvmError::InvalidPositiveConstraint`] for an index outside the feature map.
pub fn solve_one_slack_qp<F: Float, Y, S: QpSolver<F>>(
    constraints: &ConstraintStore<F, Y>,
    size_psi: usize,
    c: F,
    positive_constraint: Option<&[usize]>,
    solver: &S,
) -> Result<DualSolution<F>> {
    let positive_constraint = positive_constraint.unwrap_or(&[]);
    if let Some(&index) = positive_constraint.iter().find(|&&j| j >= size_psi) {
        return Err(SsvmError::InvalidPositiveConstraint { index, size_psi });
    }

    let nconstraints = constraints.len();
    let psi = constraints.psi_matrix(size_psi);
    let losses = constraints.losses();
    let kernel = psi.dot(&psi.t());

    let mut problem = dual_problem(&psi, kernel.clone(), &losses, c, positive_constraint);
    let mut solution = solver.solve_qp(&problem);
    if !solution.status.is_optimal() {
        warn!(
            status = ?solution.status,
            nconstraints,
            "regularizing QP"
        );
        problem
            .p
            .diag_mut()
            .mapv_inplace(|v| v + F::cast(QP_REGULARIZATION));
        solution = solver.solve_qp(&problem);
        if !solution.status.is_optimal() {
            return Err(SsvmError::SolverFailure {
                status: solution.status,
                nconstraints,
            });
        }
    }

    let alpha = solution.x;
    let w = alpha.dot(&psi);
    let objective = losses.dot(&alpha) - alpha.dot(&kernel.dot(&alpha)) / F::cast(2.0);

    let nsupport = alpha
        .iter()
        .filter(|&&a| a > F::cast(SUPPORT_THRESHOLD))
        .count();
    debug!(
        "{} support vectors out of {} constraints",
        nsupport, nconstraints
    );

    Ok(DualSolution {
        alpha,
        w,
        objective,
        nsupport,
    })
}
