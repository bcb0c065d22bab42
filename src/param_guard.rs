use std::error::Error;

use crate::problem::StructuredProblem;
use crate::traits::{Fit, FitWith};
use crate::Float;

/// A set of hyperparameters whose values have not been checked for validity. A reference to the
/// checked hyperparameters can only be obtained after checking has completed. If `Fit` or
/// `FitWith` have been implemented on the checked hyperparameters, they will also be implemented
/// on the unchecked hyperparameters with the checking step done automatically.
///
/// The hyperparameter validation done in `check_ref()` and `check()` should be identical.
pub trait ParamGuard {
    /// The checked hyperparameters
    type Checked;
    /// Error type resulting from failed hyperparameter checking
    type Error: Error;

    /// Checks the hyperparameters and returns a reference to the checked hyperparameters if
    /// successful
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error>;

    /// Checks the hyperparameters and returns the checked hyperparameters if successful
    fn check(self) -> Result<Self::Checked, Self::Error>;

    /// Calls `check()` and unwraps the result
    fn check_unwrap(self) -> Self::Checked
    where
        Self: Sized,
    {
        self.check().unwrap()
    }
}

/// Performs checking step and calls `fit` on the checked hyperparameters. If checking failed, the
/// checking error is converted to the original error type of `Fit` and returned.
impl<F, P, E, G> Fit<F, P, E> for G
where
    F: Float,
    P: StructuredProblem<F>,
    E: Error + From<G::Error>,
    G: ParamGuard,
    G::Checked: Fit<F, P, E>,
{
    type Object = <G::Checked as Fit<F, P, E>>::Object;

    fn fit(
        &self,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::Object, E> {
        let checked = self.check_ref()?;
        checked.fit(problem, records, targets)
    }
}

/// Performs checking step and calls `fit_with` on the checked hyperparameters. If checking failed,
/// the checking error is converted to the original error type of `FitWith` and returned.
impl<F, P, E, G> FitWith<F, P, E> for G
where
    F: Float,
    P: StructuredProblem<F>,
    E: Error + From<G::Error>,
    G: ParamGuard,
    G::Checked: FitWith<F, P, E>,
{
    type ObjectIn = <G::Checked as FitWith<F, P, E>>::ObjectIn;
    type ObjectOut = <G::Checked as FitWith<F, P, E>>::ObjectOut;

    fn fit_with(
        &self,
        model: Self::ObjectIn,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::ObjectOut, E> {
        let checked = self.check_ref()?;
        checked.fit_with(model, problem, records, targets)
    }
}
