//! Error types of the structured SVM learner
//!
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use thiserror::Error;

use crate::qp::QpStatus;

pub type Result<T> = std::result::Result<T, SsvmError>;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsvmError {
    #[error("C should be positive and finite, but is {0}")]
    InvalidC(f32),
    #[error("maximal number of iterations must be bigger than 0")]
    InvalidMaxIter,
    #[error("tolerance should be positive and finite, but is {0}")]
    InvalidTol(f32),
    #[error("number of jobs must be -1 or bigger than 0, but is {0}")]
    InvalidNJobs(i32),
    #[error("positive constraint on feature {index}, but the feature map has only {size_psi} entries")]
    InvalidPositiveConstraint { index: usize, size_psi: usize },
    #[error("training set is empty")]
    NotEnoughSamples,
    #[error("number of records ({records}) and targets ({targets}) differ")]
    DimensionMismatch { records: usize, targets: usize },
    #[error("feature difference has length {found}, but the feature map has {expected} entries")]
    FeatureDimension { expected: usize, found: usize },
    #[error("input {index} has {found} features, but the problem expects {expected}")]
    InputDimension {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("warm start constraint {index} does not fit the training set: {reason}")]
    WarmStartMismatch { index: usize, reason: String },
    #[error("QP solver returned {status:?} for {nconstraints} constraints, even after regularization")]
    SolverFailure {
        status: QpStatus,
        nconstraints: usize,
    },
    #[error("bad inference in iteration {iteration}: new slack {slack} is smaller than slack {old_slack} of constraint {index}")]
    InferenceInconsistency {
        iteration: usize,
        index: usize,
        slack: f64,
        old_slack: f64,
    },
    #[error("could not build thread pool: {0}")]
    ThreadPool(String),
}
