//! Rejection of redundant or unsound working constraints
//!
//! The cutting-plane method only makes progress when inference returns the truly most violated
//! constraint. A constraint which is already satisfied or which repeats an earlier one adds
//! nothing, and one which is less violated than an older constraint under the current weights
//! exposes approximate inference. In all three cases training stops.
use crate::constraint::ConstraintStore;
use crate::problem::Labeling;
use crate::Float;
use ndarray::ArrayView1;

/// Slack below which a constraint counts as satisfied
pub const SLACK_TOLERANCE: f64 = 1e-5;

/// Verdict on a freshly found working constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintCheck<F> {
    Accepted,
    /// The slack is below [`SLACK_TOLERANCE`]
    Satisfied,
    /// The outputs equal those of the stored constraint at `index`
    Duplicate { index: usize },
    /// The stored constraint at `index` is more violated than the new one
    Inconsistent { index: usize, slack: F, old_slack: F },
}

impl<F> ConstraintCheck<F> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ConstraintCheck::Accepted)
    }
}

/// Decide whether a working constraint with `outputs` and `slack` should be added to `store`
///
/// With `check_constraints` every stored constraint is compared against the new one, which
/// costs a dot product per stored constraint.
pub fn check_constraint<F: Float, Y: Labeling>(
    outputs: &[Y],
    slack: F,
    store: &ConstraintStore<F, Y>,
    w: ArrayView1<F>,
    check_constraints: bool,
) -> ConstraintCheck<F> {
    let tolerance = F::cast(SLACK_TOLERANCE);
    if slack < tolerance {
        return ConstraintCheck::Satisfied;
    }

    let duplicate = store.iter().position(|old| {
        old.outputs().len() == outputs.len()
            && outputs
                .iter()
                .zip(old.outputs())
                .all(|(y, y_old)| y.unwrap_pairwise() == y_old.unwrap_pairwise())
    });
    if let Some(index) = duplicate {
        return ConstraintCheck::Duplicate { index };
    }

    if check_constraints {
        for (index, old) in store.iter().enumerate() {
            let old_slack = F::max(old.slack(w), F::zero());
            tracing::trace!(index, %old_slack, "slack of stored constraint");
            if slack - old_slack < -tolerance {
                return ConstraintCheck::Inconsistent {
                    index,
                    slack,
                    old_slack,
                };
            }
        }
    }

    ConstraintCheck::Accepted
}

#[cfg(test)]
mod tests {
    use super::{check_constraint, ConstraintCheck};
    use crate::constraint::{ConstraintStore, WorkingConstraint};
    use crate::problem::PairwiseLabeling;
    use ndarray::array;

    fn store() -> ConstraintStore<f64, Vec<usize>> {
        vec![
            WorkingConstraint::new(vec![vec![0, 1], vec![1]], array![1.0, 0.0], 1.0),
            WorkingConstraint::new(vec![vec![1, 1], vec![0]], array![0.0, 1.0], 0.8),
        ]
        .into()
    }

    #[test]
    fn satisfied_constraint_is_rejected() {
        let w = array![0.0, 0.0];
        let res = check_constraint(&[vec![1, 0], vec![0]], 1e-6, &store(), w.view(), true);
        assert_eq!(res, ConstraintCheck::Satisfied);
        assert!(!res.is_accepted());
    }

    #[test]
    fn repeated_outputs_are_rejected() {
        let w = array![0.0, 0.0];
        let res = check_constraint(&[vec![1, 1], vec![0]], 0.5, &store(), w.view(), false);
        assert_eq!(res, ConstraintCheck::Duplicate { index: 1 });
    }

    #[test]
    fn pairwise_marginals_do_not_count() {
        let w = array![0.0];
        let store: ConstraintStore<f64, _> = vec![WorkingConstraint::new(
            vec![PairwiseLabeling {
                unary: vec![0, 1],
                pairwise: array![0.2, 0.8],
            }],
            array![1.0],
            1.0,
        )]
        .into();

        let same_labeling = [PairwiseLabeling {
            unary: vec![0, 1],
            pairwise: array![0.9, 0.1],
        }];
        let res = check_constraint(&same_labeling, 0.5, &store, w.view(), false);
        assert_eq!(res, ConstraintCheck::Duplicate { index: 0 });
    }

    #[test]
    fn less_violated_constraint_is_inconsistent() {
        // slack of the first stored constraint is 1.0 - 0.2 = 0.8
        let w = array![0.2, 0.0];
        let res = check_constraint(&[vec![1, 0], vec![0]], 0.3, &store(), w.view(), true);
        match res {
            ConstraintCheck::Inconsistent {
                index,
                slack,
                old_slack,
            } => {
                assert_eq!(index, 0);
                assert!((slack - 0.3).abs() < 1e-12);
                assert!((old_slack - 0.8).abs() < 1e-12);
            }
            other => panic!("expected inconsistent constraint, got {:?}", other),
        }

        // not checked when disabled
        let res = check_constraint(&[vec![1, 0], vec![0]], 0.3, &store(), w.view(), false);
        assert_eq!(res, ConstraintCheck::Accepted);
    }

    #[test]
    fn violated_constraint_is_accepted() {
        let w = array![0.5, 0.5];
        let res = check_constraint(&[vec![1, 0], vec![0]], 0.9, &store(), w.view(), true);
        assert!(res.is_accepted());
    }
}
