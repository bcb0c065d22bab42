//! Provide traits for different classes of algorithms
//!
use crate::problem::StructuredProblem;
use crate::Float;
use std::error::Error;

/// Fittable algorithms
///
/// A fittable algorithm takes a structured problem together with training records and their
/// true outputs and creates a model. The problem stays with the caller, it is needed again for
/// prediction.
pub trait Fit<F: Float, P: StructuredProblem<F>, E: Error> {
    type Object;

    fn fit(
        &self,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::Object, E>;
}

/// Warm-started algorithms
///
/// Continue training from the state of an earlier run, for example the working constraints of
/// a previously fitted model.
pub trait FitWith<F: Float, P: StructuredProblem<F>, E: Error> {
    type ObjectIn;
    type ObjectOut;

    fn fit_with(
        &self,
        model: Self::ObjectIn,
        problem: &P,
        records: &[P::Input],
        targets: &[P::Output],
    ) -> Result<Self::ObjectOut, E>;
}

/// Predict structured outputs
pub trait Predict<F: Float, P: StructuredProblem<F>> {
    fn predict(&self, problem: &P, records: &[P::Input]) -> Vec<P::Output>;
}
