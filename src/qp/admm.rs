use super::cholesky::{CholeskyFactor, KktFactor};
use super::{QpProblem, QpSolution, QpSolver, QpStatus};
use crate::Float;
use linfa_linalg::LinalgError;
use ndarray::{s, Array1, Array2, Axis, Zip};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Step size multiplier of equality rows
const EQUALITY_SCALE: f64 = 1e3;
const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
/// Refactorize only when the step size changes by more than this factor
const RHO_ADAPT_FACTOR: f64 = 5.0;
/// Number of termination checks between step size updates
const RHO_ADAPT_CHECKS: usize = 5;
/// Smallest default tolerance, raised to `sqrt(epsilon)` for single precision
const DEFAULT_TOLERANCE: f64 = 1e-7;
const POLISH_DELTA: f64 = 1e-7;
const POLISH_REFINE_ITER: usize = 10;
/// Upper bound on the rows dropped from or added to the active set while polishing
const POLISH_ACTIVE_SET_CHANGES: usize = 25;

/// `value`, but never below the square root of the machine precision of `F`
fn precision_floor<F: Float>(value: f64) -> F {
    F::max(F::cast(value), F::epsilon().sqrt())
}

/// Parameters of the ADMM solver
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SolverParams<F: Float> {
    /// Absolute tolerance of primal and dual residuals
    pub eps_abs: F,
    /// Relative tolerance of primal and dual residuals
    pub eps_rel: F,
    pub max_iter: usize,
    /// Initial step size
    pub rho: F,
    /// Proximal regularization of the x-update
    pub sigma: F,
    /// Over-relaxation, should lie in (0, 2)
    pub alpha: F,
    /// Iterations between two termination checks
    pub check_every: usize,
    /// Solve the KKT system of the detected active set after convergence
    pub polish: bool,
}

impl<F: Float> Default for SolverParams<F> {
    /// Tolerances of `1e-7` in double precision and `sqrt(f32::EPSILON)` in single precision
    fn default() -> Self {
        SolverParams {
            eps_abs: precision_floor(DEFAULT_TOLERANCE),
            eps_rel: precision_floor(DEFAULT_TOLERANCE),
            max_iter: 20_000,
            rho: F::cast(0.1),
            sigma: F::cast(1e-6),
            alpha: F::cast(1.6),
            check_every: 10,
            polish: true,
        }
    }
}

/// Dense operator-splitting QP solver
///
/// Follows the OSQP scheme: the inequality and equality rows are stacked into one constraint
/// matrix `C` with bounds `l <= C x <= u`, and the iteration alternates between a linear solve
/// with `P + sigma I + C^T R C`, a projection onto the bounds and a dual update. The matrix is
/// factorized once and again only when the step size `R` is adapted to the ratio of the primal
/// and dual residuals.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct AdmmSolver<F: Float> {
    params: SolverParams<F>,
}

impl<F: Float> Default for AdmmSolver<F> {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl<F: Float> AdmmSolver<F> {
    pub fn new(params: SolverParams<F>) -> Self {
        AdmmSolver { params }
    }

    pub fn params(&self) -> &SolverParams<F> {
        &self.params
    }
}

impl<F: Float> QpSolver<F> for AdmmSolver<F> {
    fn solve_qp(&self, problem: &QpProblem<F>) -> QpSolution<F> {
        match AdmmState::new(problem, &self.params) {
            Some(state) => state.solve(),
            None => QpSolution {
                status: QpStatus::NumericalError,
                x: Array1::zeros(problem.nvariables()),
                objective: F::nan(),
                iterations: 0,
            },
        }
    }
}

struct Residuals<F> {
    primal: F,
    dual: F,
    primal_scale: F,
    dual_scale: F,
}

/// Current iterate of the ADMM solver
struct AdmmState<'a, F: Float> {
    problem: &'a QpProblem<F>,
    params: &'a SolverParams<F>,
    /// Stacked constraint matrix `[G; A]`
    constraints: Array2<F>,
    lower: Array1<F>,
    upper: Array1<F>,
    /// Number of inequality rows, the equality rows follow
    nineq: usize,
    rho: F,
    rho_vec: Array1<F>,
    factor: CholeskyFactor<F>,
    x: Array1<F>,
    z: Array1<F>,
    y: Array1<F>,
}

fn norm_inf<F: Float>(v: &Array1<F>) -> F {
    v.iter().fold(F::zero(), |acc, x| F::max(acc, x.abs()))
}

impl<'a, F: Float> AdmmState<'a, F> {
    fn new(problem: &'a QpProblem<F>, params: &'a SolverParams<F>) -> Option<Self> {
        let n = problem.nvariables();
        let nineq = problem.g.nrows();
        let nconstraints = nineq + problem.a.nrows();

        let mut constraints = Array2::zeros((nconstraints, n));
        constraints.slice_mut(s![..nineq, ..]).assign(&problem.g);
        constraints.slice_mut(s![nineq.., ..]).assign(&problem.a);

        let mut lower = Array1::from_elem(nconstraints, F::neg_infinity());
        lower.slice_mut(s![nineq..]).assign(&problem.b);
        let mut upper = Array1::zeros(nconstraints);
        upper.slice_mut(s![..nineq]).assign(&problem.h);
        upper.slice_mut(s![nineq..]).assign(&problem.b);

        let rho = params.rho;
        let rho_vec = Self::rho_vector(nineq, nconstraints, rho);
        let factor = Self::factorize(problem, &constraints, &rho_vec, params.sigma).ok()?;

        Some(AdmmState {
            problem,
            params,
            constraints,
            lower,
            upper,
            nineq,
            rho,
            rho_vec,
            factor,
            x: Array1::zeros(n),
            z: Array1::zeros(nconstraints),
            y: Array1::zeros(nconstraints),
        })
    }

    fn rho_vector(nineq: usize, nconstraints: usize, rho: F) -> Array1<F> {
        let equality_rho = rho * F::cast(EQUALITY_SCALE);
        (0..nconstraints)
            .map(|i| if i < nineq { rho } else { equality_rho })
            .collect()
    }

    /// Factorize `P + sigma I + C^T R C`
    fn factorize(
        problem: &QpProblem<F>,
        constraints: &Array2<F>,
        rho_vec: &Array1<F>,
        sigma: F,
    ) -> Result<CholeskyFactor<F>, LinalgError> {
        let scaled = constraints * &rho_vec.view().insert_axis(Axis(1));
        let mut kkt = &problem.p + &constraints.t().dot(&scaled);
        kkt.diag_mut().mapv_inplace(|v| v + sigma);

        CholeskyFactor::new(kkt)
    }

    fn step(&mut self) -> Result<(), LinalgError> {
        let alpha = self.params.alpha;
        let one_minus_alpha = F::one() - alpha;

        let rhs = &self.x * self.params.sigma - &self.problem.q
            + self
                .constraints
                .t()
                .dot(&(&self.rho_vec * &self.z - &self.y));
        let x_tilde = self.factor.solve(&rhs)?;
        let z_tilde = self.constraints.dot(&x_tilde);

        self.x = &x_tilde * alpha + &self.x * one_minus_alpha;
        let z_relaxed = &z_tilde * alpha + &self.z * one_minus_alpha;

        let z_next = Zip::from(&z_relaxed)
            .and(&self.y)
            .and(&self.rho_vec)
            .and(&self.lower)
            .and(&self.upper)
            .map_collect(|&z, &y, &rho, &l, &u| F::min(F::max(z + y / rho, l), u));

        self.y = &self.y + &((&z_relaxed - &z_next) * &self.rho_vec);
        self.z = z_next;
        Ok(())
    }

    fn residuals(&self) -> Residuals<F> {
        let cx = self.constraints.dot(&self.x);
        let px = self.problem.p.dot(&self.x);
        let cty = self.constraints.t().dot(&self.y);

        Residuals {
            primal: norm_inf(&(&cx - &self.z)),
            dual: norm_inf(&(&px + &self.problem.q + &cty)),
            primal_scale: F::max(norm_inf(&cx), norm_inf(&self.z)),
            dual_scale: F::max(
                F::max(norm_inf(&px), norm_inf(&cty)),
                norm_inf(&self.problem.q),
            ),
        }
    }

    fn converged(&self, res: &Residuals<F>) -> bool {
        let eps_abs = self.params.eps_abs;
        let eps_rel = self.params.eps_rel;

        res.primal <= eps_abs + eps_rel * res.primal_scale
            && res.dual <= eps_abs + eps_rel * res.dual_scale
    }

    /// Balance primal and dual residuals by rescaling the step size
    fn adapt_rho(&mut self, res: &Residuals<F>) {
        let tiny = F::min_positive_value();
        let primal = res.primal / (res.primal_scale + tiny);
        let dual = res.dual / (res.dual_scale + tiny);

        let rho = self.rho * (primal / (dual + tiny)).sqrt();
        let rho = F::min(F::max(rho, F::cast(RHO_MIN)), F::cast(RHO_MAX));

        let factor = F::cast(RHO_ADAPT_FACTOR);
        if rho > self.rho * factor || rho < self.rho / factor {
            let rho_vec = Self::rho_vector(self.nineq, self.constraints.nrows(), rho);
            if let Ok(factor) =
                Self::factorize(self.problem, &self.constraints, &rho_vec, self.params.sigma)
            {
                self.rho = rho;
                self.rho_vec = rho_vec;
                self.factor = factor;
            }
        }
    }

    /// Solve the equality constrained problem on the rows `active` and refine the solution
    /// against the unregularized system
    fn solve_active(&self, active: &[usize]) -> Option<(Array1<F>, Array1<F>)> {
        let rows = self.constraints.select(Axis(0), active);
        let bounds = self.upper.select(Axis(0), active);
        let delta = precision_floor(POLISH_DELTA);
        let factor = KktFactor::new(&self.problem.p, rows, delta).ok()?;

        let neg_q = self.problem.q.mapv(|v| -v);
        let (mut x, mut y) = factor.solve(&neg_q, &bounds).ok()?;
        for _ in 0..POLISH_REFINE_ITER {
            let rx = &neg_q - &self.problem.p.dot(&x) - &factor.rows().t().dot(&y);
            let ry = &bounds - &factor.rows().dot(&x);
            let (dx, dy) = factor.solve(&rx, &ry).ok()?;
            x = x + dx;
            y = y + dy;
        }

        if x.iter().chain(y.iter()).all(|v| v.is_finite()) {
            Some((x, y))
        } else {
            None
        }
    }

    /// Polish the ADMM iterate with a primal-dual active set method
    ///
    /// Starts from the rows the iterate is tight on. Inequality rows with a negative multiplier
    /// leave the active set, violated inequality rows join it, one at a time. Returns `None` when
    /// no KKT point was found within [`POLISH_ACTIVE_SET_CHANGES`] changes.
    fn polish(&self) -> Option<Array1<F>> {
        let nconstraints = self.constraints.nrows();
        let mut active = (0..nconstraints)
            .map(|i| i >= self.nineq || self.upper[i] - self.z[i] < self.y[i])
            .collect::<Vec<_>>();

        let eps_abs = self.params.eps_abs;
        let eps_rel = self.params.eps_rel;
        let dual_tol = eps_abs + eps_rel * F::max(norm_inf(&self.problem.q), F::one());

        for _ in 0..=POLISH_ACTIVE_SET_CHANGES {
            let rows = (0..nconstraints).filter(|&i| active[i]).collect::<Vec<_>>();
            let (x, y) = self.solve_active(&rows)?;

            let most_negative = rows
                .iter()
                .zip(y.iter())
                .filter(|(&i, _)| i < self.nineq)
                .fold(None, |best: Option<(usize, F)>, (&i, &yi)| match best {
                    Some((_, min)) if min <= yi => best,
                    _ => Some((i, yi)),
                });
            if let Some((i, yi)) = most_negative {
                if yi < -dual_tol {
                    active[i] = false;
                    continue;
                }
            }

            let cx = self.constraints.dot(&x);
            let primal_tol = eps_abs + eps_rel * F::max(norm_inf(&cx), F::one());
            let most_violated = (0..self.nineq)
                .filter(|&i| !active[i])
                .map(|i| (i, cx[i] - self.upper[i]))
                .fold(None, |best: Option<(usize, F)>, (i, v)| match best {
                    Some((_, max)) if max >= v => best,
                    _ => Some((i, v)),
                });
            if let Some((i, v)) = most_violated {
                if v > primal_tol {
                    active[i] = true;
                    continue;
                }
            }

            let violation = Zip::from(&cx)
                .and(&self.lower)
                .and(&self.upper)
                .fold(F::zero(), |acc, &c, &l, &u| {
                    F::max(acc, F::max(c - u, l - c))
                });
            let stationarity = norm_inf(
                &(self.problem.p.dot(&x)
                    + &self.problem.q
                    + self.constraints.select(Axis(0), &rows).t().dot(&y)),
            );

            return if violation <= primal_tol && stationarity <= dual_tol {
                Some(x)
            } else {
                None
            };
        }

        None
    }

    fn solve(mut self) -> QpSolution<F> {
        let max_iter = self.params.max_iter;
        let check_every = self.params.check_every.max(1);

        let mut status = QpStatus::MaxIterations;
        let mut iter = 0;
        let mut checks = 0;
        while iter < max_iter {
            iter += 1;
            if self.step().is_err() || !self.x.iter().all(|v| v.is_finite()) {
                status = QpStatus::NumericalError;
                break;
            }

            if iter % check_every == 0 || iter == max_iter {
                let res = self.residuals();
                if self.converged(&res) {
                    status = QpStatus::Optimal;
                    break;
                }

                checks += 1;
                if checks % RHO_ADAPT_CHECKS == 0 {
                    self.adapt_rho(&res);
                }
            }
        }

        let polished = if status.is_optimal() && self.params.polish {
            self.polish()
        } else {
            None
        };
        let x = polished.unwrap_or_else(|| self.x.clone());
        let objective = self.problem.objective(x.view());

        QpSolution {
            status,
            x,
            objective,
            iterations: iter,
        }
    }
}
