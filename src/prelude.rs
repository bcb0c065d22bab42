//! linfa-ssvm prelude.
//!
//! This module contains the most used types, type aliases, traits and
//! functions that you can import easily as a group.
//!

#[doc(no_inline)]
pub use crate::error::{Result, SsvmError};

#[doc(no_inline)]
pub use crate::traits::*;

#[doc(no_inline)]
pub use crate::param_guard::ParamGuard;

#[doc(no_inline)]
pub use crate::hyperparams::{OneSlackSsvmParams, OneSlackSsvmValidParams, ShowLoss};

#[doc(no_inline)]
pub use crate::problem::{Labeling, MostViolated, PairwiseLabeling, StructuredProblem};

#[doc(no_inline)]
pub use crate::multiclass::MultiClassProblem;

#[doc(no_inline)]
pub use crate::qp::{AdmmSolver, QpSolver, SolverParams};

#[doc(no_inline)]
pub use crate::{ExitReason, Float, OneSlackSsvm};
