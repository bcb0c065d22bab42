//! Multi-class classification as a structured problem
//!
//! The Crammer-Singer formulation: the weight vector holds one block of length `nfeatures` per
//! class and the score of class `k` is the dot product of the input with block `k`.
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, SsvmError};
use crate::problem::StructuredProblem;
use crate::Float;
use ndarray::{s, Array1, ArrayView1};

/// Multi-class problem with exhaustive inference over all classes
///
/// Outputs are class indices in `0..nclasses` and the task loss is the 0/1 loss. Add a constant
/// feature to the inputs if the classes need a bias.
#[derive(Debug)]
pub struct MultiClassProblem {
    nfeatures: usize,
    nclasses: usize,
    calls: AtomicUsize,
}

impl MultiClassProblem {
    pub fn new(nfeatures: usize, nclasses: usize) -> Self {
        MultiClassProblem {
            nfeatures,
            nclasses,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn nfeatures(&self) -> usize {
        self.nfeatures
    }

    pub fn nclasses(&self) -> usize {
        self.nclasses
    }

    fn scores<F: Float>(&self, x: &Array1<F>, w: ArrayView1<F>) -> Vec<F> {
        (0..self.nclasses)
            .map(|k| {
                w.slice(s![k * self.nfeatures..(k + 1) * self.nfeatures])
                    .dot(x)
            })
            .collect()
    }

    /// Index of the first maximal score
    fn argmax<F: Float>(scores: impl Iterator<Item = F>) -> usize {
        scores
            .enumerate()
            .fold((0, F::neg_infinity()), |best, (k, score)| {
                if score > best.1 {
                    (k, score)
                } else {
                    best
                }
            })
            .0
    }
}

impl<F: Float> StructuredProblem<F> for MultiClassProblem {
    type Input = Array1<F>;
    type Output = usize;

    fn size_psi(&self) -> usize {
        self.nfeatures * self.nclasses
    }

    fn psi(&self, x: &Array1<F>, y: &usize) -> Array1<F> {
        let mut psi = Array1::zeros(self.nfeatures * self.nclasses);
        psi.slice_mut(s![*y * self.nfeatures..(*y + 1) * self.nfeatures])
            .assign(x);
        psi
    }

    fn loss(&self, y: &usize, y_hat: &usize) -> F {
        if y == y_hat {
            F::zero()
        } else {
            F::one()
        }
    }

    fn max_loss(&self, _y: &usize) -> F {
        F::one()
    }

    fn inference(&self, x: &Array1<F>, w: ArrayView1<F>) -> usize {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Self::argmax(self.scores(x, w).into_iter())
    }

    fn loss_augmented_inference(&self, x: &Array1<F>, y: &usize, w: ArrayView1<F>) -> usize {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let scores = self.scores(x, w);
        Self::argmax(
            scores
                .into_iter()
                .enumerate()
                .map(|(k, score)| if k == *y { score } else { score + F::one() }),
        )
    }

    fn inference_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn check_input(&self, index: usize, x: &Array1<F>) -> Result<()> {
        if x.len() != self.nfeatures {
            return Err(SsvmError::InputDimension {
                index,
                expected: self.nfeatures,
                found: x.len(),
            });
        }
        Ok(())
    }
}
