//! Structured prediction problems
//!
//! The learner never looks inside the outputs. Everything it needs, the joint feature map, the
//! task loss and the two inference routines, is provided by a [`StructuredProblem`].
use crate::error::Result;
use crate::Float;
use ndarray::{Array1, ArrayView1};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Outputs which are compared when looking for repeated working constraints
///
/// Relaxed inference may return a labeling together with pairwise marginals. Only the labeling
/// takes part in the comparison, the pairwise part is stripped by `unwrap_pairwise`.
pub trait Labeling: Clone + Send + Sync {
    type Plain: PartialEq + ?Sized;

    fn unwrap_pairwise(&self) -> &Self::Plain;
}

impl Labeling for usize {
    type Plain = usize;

    fn unwrap_pairwise(&self) -> &usize {
        self
    }
}

impl<T: PartialEq + Clone + Send + Sync> Labeling for Vec<T> {
    type Plain = [T];

    fn unwrap_pairwise(&self) -> &[T] {
        self
    }
}

impl<T: PartialEq + Clone + Send + Sync> Labeling for Array1<T> {
    type Plain = Array1<T>;

    fn unwrap_pairwise(&self) -> &Array1<T> {
        self
    }
}

/// A labeling with additional pairwise information attached
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseLabeling<U, P> {
    pub unary: U,
    pub pairwise: P,
}

impl<U: Labeling, P: Clone + Send + Sync> Labeling for PairwiseLabeling<U, P> {
    type Plain = U::Plain;

    fn unwrap_pairwise(&self) -> &U::Plain {
        self.unary.unwrap_pairwise()
    }
}

/// The most violating output of a single example
#[derive(Debug, Clone, PartialEq)]
pub struct MostViolated<F, Y> {
    pub y_hat: Y,
    /// `psi(x, y) - psi(x, y_hat)`
    pub dpsi: Array1<F>,
    /// `loss(y, y_hat)`
    pub loss: F,
}

/// Problem formulation of a structured SVM
///
/// Implementations are shared between the worker threads searching for violated constraints,
/// every method therefore takes `&self`. Keep a thread-safe counter of the inference calls,
/// it is reported after training.
pub trait StructuredProblem<F: Float>: Sync {
    type Input: Sync;
    type Output: Labeling;

    /// Length of the joint feature map
    fn size_psi(&self) -> usize;

    /// Joint feature map of an input and an output
    fn psi(&self, x: &Self::Input, y: &Self::Output) -> Array1<F>;

    /// Task loss for predicting `y_hat` instead of `y`
    fn loss(&self, y: &Self::Output, y_hat: &Self::Output) -> F;

    /// Largest loss any prediction could have for `y`
    fn max_loss(&self, y: &Self::Output) -> F;

    /// Highest scoring output under weights `w`
    fn inference(&self, x: &Self::Input, w: ArrayView1<F>) -> Self::Output;

    /// Output maximizing score plus loss with respect to the true output `y`
    fn loss_augmented_inference(
        &self,
        x: &Self::Input,
        y: &Self::Output,
        w: ArrayView1<F>,
    ) -> Self::Output;

    /// Number of inference calls made so far
    fn inference_calls(&self) -> usize;

    /// Validate the input of example `index` before any inference runs on it
    ///
    /// The default accepts every input. Problems whose feature map assumes a fixed input shape
    /// should return [`SsvmError::InputDimension`](crate::SsvmError::InputDimension) here
    /// instead of panicking in `psi` or the inference routines.
    fn check_input(&self, _index: usize, _x: &Self::Input) -> Result<()> {
        Ok(())
    }

    /// Find the most violating output of one example together with its feature difference and
    /// loss
    fn find_most_violated(
        &self,
        x: &Self::Input,
        y: &Self::Output,
        w: ArrayView1<F>,
    ) -> MostViolated<F, Self::Output> {
        let y_hat = self.loss_augmented_inference(x, y, w);
        let dpsi = self.psi(x, y) - self.psi(x, &y_hat);
        let loss = self.loss(y, &y_hat);

        MostViolated { y_hat, dpsi, loss }
    }
}
