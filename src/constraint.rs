//! Working constraints and the search for the most violated one
//!
//! A working constraint of the 1-slack formulation summarizes one cutting plane. It is built from
//! the most violating output of every training example by averaging their feature differences
//! and losses.
use crate::error::{Result, SsvmError};
use crate::executor::Executor;
use crate::problem::StructuredProblem;
use crate::Float;
use ndarray::{Array1, Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A single cutting plane
///
/// Contains the most violating output of each example, the mean feature difference
/// `mean_i psi(x_i, y_i) - psi(x_i, y_hat_i)` and the mean loss.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingConstraint<F: Float, Y> {
    outputs: Vec<Y>,
    dpsi_mean: Array1<F>,
    loss_mean: F,
}

impl<F: Float, Y> WorkingConstraint<F, Y> {
    pub fn new(outputs: Vec<Y>, dpsi_mean: Array1<F>, loss_mean: F) -> Self {
        WorkingConstraint {
            outputs,
            dpsi_mean,
            loss_mean,
        }
    }

    pub fn outputs(&self) -> &[Y] {
        &self.outputs
    }

    pub fn dpsi_mean(&self) -> ArrayView1<F> {
        self.dpsi_mean.view()
    }

    pub fn loss_mean(&self) -> F {
        self.loss_mean
    }

    /// Violation of this constraint under weights `w`, may be negative
    pub fn slack(&self, w: ArrayView1<F>) -> F {
        self.loss_mean - w.dot(&self.dpsi_mean)
    }
}

/// Ordered collection of working constraints
///
/// Constraints are only ever appended. The position of a constraint is the index of its dual
/// variable.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintStore<F: Float, Y> {
    constraints: Vec<WorkingConstraint<F, Y>>,
}

impl<F: Float, Y> Default for ConstraintStore<F, Y> {
    fn default() -> Self {
        ConstraintStore {
            constraints: Vec::new(),
        }
    }
}

impl<F: Float, Y> From<Vec<WorkingConstraint<F, Y>>> for ConstraintStore<F, Y> {
    fn from(constraints: Vec<WorkingConstraint<F, Y>>) -> Self {
        ConstraintStore { constraints }
    }
}

impl<F: Float, Y> ConstraintStore<F, Y> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&WorkingConstraint<F, Y>> {
        self.constraints.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkingConstraint<F, Y>> {
        self.constraints.iter()
    }

    pub(crate) fn push(&mut self, constraint: WorkingConstraint<F, Y>) {
        self.constraints.push(constraint);
    }

    /// Stack the mean feature differences into a `(n_constraints, size_psi)` matrix
    pub fn psi_matrix(&self, size_psi: usize) -> Array2<F> {
        let mut psi = Array2::zeros((self.len(), size_psi));
        for (mut row, constraint) in psi.outer_iter_mut().zip(self.iter()) {
            row.assign(&constraint.dpsi_mean);
        }
        psi
    }

    /// Mean losses of all constraints
    pub fn losses(&self) -> Array1<F> {
        self.iter().map(|c| c.loss_mean).collect()
    }

    /// Check that constraints found on another run fit a training set of `nsamples` examples and
    /// a feature map of length `size_psi`
    pub(crate) fn validate(&self, nsamples: usize, size_psi: usize) -> Result<()> {
        for (index, constraint) in self.iter().enumerate() {
            if constraint.outputs.len() != nsamples {
                return Err(SsvmError::WarmStartMismatch {
                    index,
                    reason: format!(
                        "{} outputs for {} examples",
                        constraint.outputs.len(),
                        nsamples
                    ),
                });
            }
            if constraint.dpsi_mean.len() != size_psi {
                return Err(SsvmError::WarmStartMismatch {
                    index,
                    reason: format!(
                        "feature difference of length {} for a feature map of length {}",
                        constraint.dpsi_mean.len(),
                        size_psi
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Search the most violating output of every example and average them into a working
/// constraint
///
/// Returns the constraint and its slack `loss_mean - <w, dpsi_mean>` under the current weights.
pub(crate) fn find_working_constraint<F: Float, P: StructuredProblem<F>>(
    problem: &P,
    records: &[P::Input],
    targets: &[P::Output],
    w: ArrayView1<F>,
    executor: &Executor,
) -> Result<(WorkingConstraint<F, P::Output>, F)> {
    let nsamples = records.len();
    let results = executor.map_indices(nsamples, |i| {
        problem.find_most_violated(&records[i], &targets[i], w)
    });

    let mut outputs = Vec::with_capacity(nsamples);
    let mut dpsi_mean = Array1::zeros(w.len());
    let mut loss_mean = F::zero();
    for result in results {
        if result.dpsi.len() != w.len() {
            return Err(SsvmError::FeatureDimension {
                expected: w.len(),
                found: result.dpsi.len(),
            });
        }
        dpsi_mean += &result.dpsi;
        loss_mean += result.loss;
        outputs.push(result.y_hat);
    }

    let n = F::cast(nsamples);
    dpsi_mean.mapv_inplace(|v| v / n);
    loss_mean /= n;

    let constraint = WorkingConstraint::new(outputs, dpsi_mean, loss_mean);
    let slack = constraint.slack(w);

    Ok((constraint, slack))
}

#[cfg(test)]
mod tests {
    use super::{find_working_constraint, ConstraintStore, WorkingConstraint};
    use crate::executor::Executor;
    use crate::multiclass::MultiClassProblem;
    use crate::problem::{MostViolated, StructuredProblem};
    use crate::SsvmError;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, ArrayView1};

    #[test]
    fn averages_over_examples() {
        let problem = MultiClassProblem::new(2, 2);
        let records = vec![array![1.0, 0.0], array![0.0, 2.0]];
        let targets = vec![0, 1];
        let w = Array1::<f64>::zeros(4);

        let executor = Executor::new(1).unwrap();
        let (constraint, slack) =
            find_working_constraint(&problem, &records, &targets, w.view(), &executor).unwrap();

        // with zero weights the loss decides, so the other class is picked
        assert_eq!(constraint.outputs(), &[1, 0]);
        assert_abs_diff_eq!(
            constraint.dpsi_mean(),
            array![0.5, -1.0, -0.5, 1.0]
        );
        assert_abs_diff_eq!(constraint.loss_mean(), 1.0);
        assert_abs_diff_eq!(slack, 1.0);
        assert_eq!(StructuredProblem::<f64>::inference_calls(&problem), 2);
    }

    #[test]
    fn repeated_search_is_deterministic() {
        let problem = MultiClassProblem::new(2, 3);
        let records = vec![array![1.0, 0.5], array![-0.3, 2.0], array![0.7, -1.2]];
        let targets = vec![0, 1, 2];
        let w = array![0.1, -0.2, 0.3, 0.0, -0.5, 0.4];

        for n_jobs in &[1, 2] {
            let executor = Executor::new(*n_jobs).unwrap();
            let first =
                find_working_constraint(&problem, &records, &targets, w.view(), &executor)
                    .unwrap();
            let second =
                find_working_constraint(&problem, &records, &targets, w.view(), &executor)
                    .unwrap();
            assert_eq!(first, second);
        }
    }

    struct WrongSize;

    impl StructuredProblem<f64> for WrongSize {
        type Input = ();
        type Output = usize;

        fn size_psi(&self) -> usize {
            3
        }
        fn psi(&self, _: &(), _: &usize) -> Array1<f64> {
            Array1::zeros(2)
        }
        fn loss(&self, _: &usize, _: &usize) -> f64 {
            0.0
        }
        fn max_loss(&self, _: &usize) -> f64 {
            1.0
        }
        fn inference(&self, _: &(), _: ArrayView1<f64>) -> usize {
            0
        }
        fn loss_augmented_inference(&self, _: &(), _: &usize, _: ArrayView1<f64>) -> usize {
            0
        }
        fn inference_calls(&self) -> usize {
            0
        }
        fn find_most_violated(
            &self,
            _: &(),
            _: &usize,
            _: ArrayView1<f64>,
        ) -> MostViolated<f64, usize> {
            MostViolated {
                y_hat: 0,
                dpsi: Array1::zeros(2),
                loss: 0.0,
            }
        }
    }

    #[test]
    fn rejects_wrong_feature_dimension() {
        let executor = Executor::new(1).unwrap();
        let w = Array1::zeros(3);
        let res = find_working_constraint(&WrongSize, &[()], &[0], w.view(), &executor);
        assert_eq!(
            res.unwrap_err(),
            SsvmError::FeatureDimension {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn warm_start_validation() {
        let store: ConstraintStore<f64, usize> = vec![
            WorkingConstraint::new(vec![0, 1], array![1.0, 0.0], 1.0),
            WorkingConstraint::new(vec![0], array![1.0, 0.0], 1.0),
        ]
        .into();

        assert!(store.validate(2, 2).is_err());
        assert!(matches!(
            store.validate(2, 2),
            Err(SsvmError::WarmStartMismatch { index: 1, .. })
        ));
        assert!(matches!(
            store.validate(2, 3),
            Err(SsvmError::WarmStartMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn psi_matrix_follows_insertion_order() {
        let mut store = ConstraintStore::new();
        store.push(WorkingConstraint::new(vec![0usize], array![1.0, 2.0], 0.5));
        store.push(WorkingConstraint::new(vec![1usize], array![3.0, 4.0], 1.5));

        assert_abs_diff_eq!(store.psi_matrix(2), array![[1.0, 2.0], [3.0, 4.0]]);
        assert_abs_diff_eq!(store.losses(), array![0.5, 1.5]);
    }
}
