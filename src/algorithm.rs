use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::checker::{check_constraint, ConstraintCheck};
use crate::constraint::{find_working_constraint, ConstraintStore};
use crate::dual::{solve_one_slack_qp, DualSolution};
use crate::error::{Result, SsvmError};
use crate::executor::Executor;
use crate::hyperparams::{OneSlackSsvmValidParams, ShowLoss};
use crate::problem::StructuredProblem;
use crate::qp::QpSolver;
use crate::traits::{Fit, FitWith, Predict};
use crate::{ExitReason, Float, OneSlackSsvm};

impl<F: Float, Y> OneSlackSsvm<F, Y> {
    /// Learned weights, one per entry of the joint feature map
    pub fn w(&self) -> ArrayView1<F> {
        self.w.view()
    }

    /// Working constraints in the order they were added, warm start constraints first
    pub fn constraints(&self) -> &ConstraintStore<F, Y> {
        &self.constraints
    }

    /// Consume the model and return its working constraints, e.g. to warm start another run
    pub fn into_constraints(self) -> ConstraintStore<F, Y> {
        self.constraints
    }

    /// Dual solution of the last iteration, `None` if no constraint was ever added
    pub fn dual_solution(&self) -> Option<&DualSolution<F>> {
        self.dual.as_ref()
    }

    /// Dual variables after every iteration
    pub fn alphas(&self) -> &[Array1<F>] {
        &self.alphas
    }

    pub fn loss_curve(&self) -> &[F] {
        &self.loss_curve
    }

    /// Dual objective after every iteration
    pub fn objective_curve(&self) -> &[F] {
        &self.objective_curve
    }

    pub fn objective(&self) -> Option<F> {
        self.dual.as_ref().map(|d| d.objective())
    }

    pub fn exit_reason(&self) -> ExitReason {
        self.exit_reason
    }

    /// Number of iterations which added a constraint
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of inference calls made during training
    pub fn inference_calls(&self) -> usize {
        self.inference_calls
    }

    pub fn nsupport(&self) -> usize {
        self.dual.as_ref().map(|d| d.nsupport()).unwrap_or(0)
    }

    /// Score of the model on a labeled set
    ///
    /// Returns `1 - sum(loss) / sum(max_loss)` of the predictions, so one for a perfect model.
    pub fn score<P>(&self, problem: &P, records: &[P::Input], targets: &[Y]) -> Result<F>
    where
        P: StructuredProblem<F, Output = Y>,
    {
        if records.len() != targets.len() {
            return Err(SsvmError::DimensionMismatch {
                records: records.len(),
                targets: targets.len(),
            });
        }
        if records.is_empty() {
            return Err(SsvmError::NotEnoughSamples);
        }
        records
            .iter()
            .enumerate()
            .try_for_each(|(i, x)| problem.check_input(i, x))?;

        let predictions = self.predict(problem, records);
        let loss = targets
            .iter()
            .zip(predictions.iter())
            .map(|(y, y_hat)| problem.loss(y, y_hat))
            .sum::<F>();
        let max_loss = targets.iter().map(|y| problem.max_loss(y)).sum::<F>();

        if max_loss > F::zero() {
            Ok(F::one() - loss / max_loss)
        } else {
            Ok(F::one())
        }
    }
}

impl<F: Float, P: StructuredProblem<F>> Predict<F, P> for OneSlackSsvm<F, P::Output> {
    /// Run inference with the learned weights on every record
    fn predict(&self, problem: &P, records: &[P::Input]) -> Vec<P::Output> {
        let w = self.w.view();
        records
            .par_iter()
            .map(|x| problem.inference(x, w))
            .collect()
    }
}

/// Mean loss of plain inference under the current weights
fn true_loss<F: Float, P: StructuredProblem<F>>(
    problem: &P,
    records: &[P::Input],
    targets: &[P::Output],
    w: ArrayView1<F>,
    executor: &Executor,
) -> F {
    let losses = executor.map_indices(records.len(), |i| {
        let y_hat = problem.inference(&records[i], w);
        problem.loss(&targets[i], &y_hat)
    });

    losses.into_iter().sum::<F>() / F::cast(records.len())
}

impl<F: Float, P: StructuredProblem<F>, S: QpSolver<F>> FitWith<F, P, SsvmError>
    for OneSlackSsvmValidParams<F, S>
{
    type ObjectIn = ConstraintStore<F, P::Output>;
    type ObjectOut = OneSlackSsvm<F, P::Output>;

    /// Learn the weights, starting with the given working constraints
    ///
    /// The weights start at zero regardless of the warm start constraints. They take part in
    /// the first dual problem together with the first new constraint.
    fn fit_with(
        &self,
        mut constraints: Self::ObjectIn,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::ObjectOut> {
        let nsamples = records.len();
        if nsamples != targets.len() {
            return Err(SsvmError::DimensionMismatch {
                records: nsamples,
                targets: targets.len(),
            });
        }
        if nsamples == 0 {
            return Err(SsvmError::NotEnoughSamples);
        }
        records
            .iter()
            .enumerate()
            .try_for_each(|(i, x)| problem.check_input(i, x))?;

        let size_psi = problem.size_psi();
        if let Some(&index) = self
            .positive_constraint()
            .and_then(|features| features.iter().find(|&&j| j >= size_psi))
        {
            return Err(SsvmError::InvalidPositiveConstraint { index, size_psi });
        }
        constraints.validate(nsamples, size_psi)?;

        let executor = Executor::new(self.n_jobs())?;
        let calls_before = problem.inference_calls();

        info!(
            nsamples,
            size_psi,
            warm_start = constraints.len(),
            "training 1-slack structured SVM"
        );

        let mut w = Array1::zeros(size_psi);
        let mut dual = None;
        let mut alphas = Vec::new();
        let mut loss_curve = Vec::new();
        let mut objective_curve: Vec<F> = Vec::new();
        let mut iterations = 0;
        let mut exit_reason = ExitReason::MaxIterReached;

        for iteration in 0..self.max_iter() {
            let (constraint, slack) =
                find_working_constraint(problem, records, targets, w.view(), &executor)?;
            debug!(
                iteration,
                slack = %slack,
                loss = %constraint.loss_mean(),
                "found working constraint"
            );

            match check_constraint(
                constraint.outputs(),
                slack,
                &constraints,
                w.view(),
                self.check_constraints(),
            ) {
                ConstraintCheck::Accepted => {}
                ConstraintCheck::Inconsistent {
                    index,
                    slack,
                    old_slack,
                } => {
                    warn!(
                        iteration,
                        index,
                        slack = %slack,
                        old_slack = %old_slack,
                        "bad inference, new constraint is less violated than a stored one"
                    );
                    if self.break_on_bad() {
                        return Err(SsvmError::InferenceInconsistency {
                            iteration,
                            index,
                            slack: slack.to_f64().unwrap_or(f64::NAN),
                            old_slack: old_slack.to_f64().unwrap_or(f64::NAN),
                        });
                    }
                    exit_reason = ExitReason::Converged;
                    break;
                }
                rejected => {
                    debug!(iteration, ?rejected, "no additional constraints");
                    exit_reason = ExitReason::Converged;
                    break;
                }
            }

            let loss = match self.show_loss() {
                ShowLoss::Augmented => constraint.loss_mean(),
                ShowLoss::True => true_loss(problem, records, targets, w.view(), &executor),
            };

            constraints.push(constraint);
            let solution = solve_one_slack_qp(
                &constraints,
                size_psi,
                self.c(),
                self.positive_constraint(),
                self.qp_solver(),
            )?;

            w = solution.w().to_owned();
            alphas.push(solution.alpha().to_owned());
            loss_curve.push(loss);
            objective_curve.push(solution.objective());
            dual = Some(solution);
            iterations += 1;

            debug!(
                iteration,
                objective = %objective_curve[objective_curve.len() - 1],
                loss = %loss,
                nconstraints = constraints.len(),
                "cutting plane iteration"
            );
            trace!(w = ?w, "current weights");

            if let Some(tol) = self.tol() {
                if let [.., previous, latest] = objective_curve.as_slice() {
                    if *latest - *previous < tol {
                        debug!(iteration, "objective improved less than {}", tol);
                        exit_reason = ExitReason::ObjectiveConverged;
                        break;
                    }
                }
            }
        }

        let inference_calls = problem.inference_calls().saturating_sub(calls_before);
        info!(iterations, ?exit_reason, "finished training");
        info!("calls to inference: {}", inference_calls);

        Ok(OneSlackSsvm {
            w,
            constraints,
            dual,
            alphas,
            loss_curve,
            objective_curve,
            exit_reason,
            iterations,
            inference_calls,
        })
    }
}

impl<F: Float, P: StructuredProblem<F>, S: QpSolver<F>> Fit<F, P, SsvmError>
    for OneSlackSsvmValidParams<F, S>
{
    type Object = OneSlackSsvm<F, P::Output>;

    fn fit(
        &self,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::Object> {
        FitWith::<F, P, SsvmError>::fit_with(
            self,
            ConstraintStore::new(),
            problem,
            records,
            targets,
        )
    }
}
