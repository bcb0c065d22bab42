use crate::error::{Result, SsvmError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Runs independent per-example computations
///
/// Results always come back in example order, whether computed sequentially or on a pool.
pub(crate) enum Executor {
    Sequential,
    /// Global rayon pool, one thread per core
    Global,
    Pool(ThreadPool),
}

impl Executor {
    /// Select an executor for `n_jobs`, where `-1` means all cores
    pub fn new(n_jobs: i32) -> Result<Self> {
        match n_jobs {
            1 => Ok(Executor::Sequential),
            -1 => Ok(Executor::Global),
            n if n > 1 => ThreadPoolBuilder::new()
                .num_threads(n as usize)
                .build()
                .map(Executor::Pool)
                .map_err(|err| SsvmError::ThreadPool(err.to_string())),
            n => Err(SsvmError::InvalidNJobs(n)),
        }
    }

    pub fn map_indices<R, G>(&self, n: usize, fnc: G) -> Vec<R>
    where
        R: Send,
        G: Fn(usize) -> R + Sync + Send,
    {
        match self {
            Executor::Sequential => (0..n).map(fnc).collect(),
            Executor::Global => (0..n).into_par_iter().map(fnc).collect(),
            Executor::Pool(pool) => pool.install(|| (0..n).into_par_iter().map(&fnc).collect()),
        }
    }
}
