use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use linfa_ssvm::prelude::*;
use linfa_ssvm::qp::{QpProblem, QpSolution, QpStatus};
use linfa_ssvm::{ConstraintStore, WorkingConstraint};
use ndarray::{array, Array1, Array2, ArrayView1};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Output returned by approximate inference once the weights are non-zero
const BAD: usize = usize::MAX;

/// Every example has a list of candidate outputs, each given by its feature difference to the
/// true output and its loss. Output `0` is the true output, output `k` the candidate `k - 1`.
struct PlaneProblem {
    size_psi: usize,
    candidates: Vec<Vec<(Array1<f64>, f64)>>,
    approximate: bool,
    settles: bool,
    calls: AtomicUsize,
}

impl PlaneProblem {
    fn new(size_psi: usize, candidates: Vec<Vec<(Array1<f64>, f64)>>) -> Self {
        PlaneProblem {
            size_psi,
            candidates,
            approximate: false,
            settles: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn approximate(mut self) -> Self {
        self.approximate = true;
        self
    }

    /// Loss-augmented inference returns the true output once the weights are non-zero
    fn settles(mut self) -> Self {
        self.settles = true;
        self
    }

    fn records(&self) -> Vec<usize> {
        (0..self.candidates.len()).collect()
    }

    fn targets(&self) -> Vec<usize> {
        vec![0; self.candidates.len()]
    }

    fn candidate(&self, x: usize, y: usize) -> (Array1<f64>, f64) {
        match y {
            0 => (Array1::zeros(self.size_psi), 0.0),
            BAD => (Array1::zeros(self.size_psi), 0.1),
            k => self.candidates[x][k - 1].clone(),
        }
    }

    /// First output maximizing `score + loss`, where the true output scores zero
    fn argmax(&self, x: usize, w: ArrayView1<f64>, with_loss: bool) -> usize {
        let mut best = (0, 0.0);
        for (k, (dpsi, loss)) in self.candidates[x].iter().enumerate() {
            let gain = if with_loss { *loss } else { 0.0 };
            let value = gain - w.dot(dpsi);
            if value > best.1 {
                best = (k + 1, value);
            }
        }
        best.0
    }
}

impl StructuredProblem<f64> for PlaneProblem {
    type Input = usize;
    type Output = usize;

    fn size_psi(&self) -> usize {
        self.size_psi
    }

    fn psi(&self, x: &usize, y: &usize) -> Array1<f64> {
        -self.candidate(*x, *y).0
    }

    fn loss(&self, _y: &usize, y_hat: &usize) -> f64 {
        self.candidate(0, *y_hat).1
    }

    fn max_loss(&self, _y: &usize) -> f64 {
        1.0
    }

    fn inference(&self, x: &usize, w: ArrayView1<f64>) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.argmax(*x, w, false)
    }

    fn loss_augmented_inference(&self, x: &usize, _y: &usize, w: ArrayView1<f64>) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let trained = w.iter().any(|&v| v != 0.0);
        if self.approximate && trained {
            BAD
        } else if self.settles && trained {
            0
        } else {
            self.argmax(*x, w, true)
        }
    }

    fn inference_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Each of two examples is violated by a single plane
fn two_examples() -> PlaneProblem {
    PlaneProblem::new(
        2,
        vec![
            vec![(array![1.0, 0.0], 1.0)],
            vec![(array![0.0, 1.0], 1.0)],
        ],
    )
}

/// One example with two orthogonal planes, needs two iterations
fn two_planes() -> PlaneProblem {
    PlaneProblem::new(
        2,
        vec![vec![(array![1.0, 0.0], 1.0), (array![0.0, 1.0], 1.0)]],
    )
}

#[test]
fn satisfied_constraint_stops_training() {
    let problem = two_examples().settles();
    let model = OneSlackSsvm::params()
        .c(1.0)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    // the second search returns the true outputs, whose slack is zero
    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_eq!(model.iterations(), 1);
    assert_eq!(model.constraints().len(), 1);
    assert_eq!(model.constraints().get(0).unwrap().outputs(), &[1, 1]);
    assert_abs_diff_eq!(model.w(), array![0.5, 0.5], epsilon = 1e-6);
    assert_eq!(model.inference_calls(), 4);
}

#[test]
fn duplicate_constraint_for_two_examples() {
    let problem = two_examples();
    let model = OneSlackSsvm::params()
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    // the second search repeats the outputs of the first one
    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_eq!(model.iterations(), 1);
    assert_eq!(model.constraints().len(), 1);
    assert_eq!(model.constraints().get(0).unwrap().outputs(), &[1, 1]);
    assert_abs_diff_eq!(model.w(), array![0.5, 0.5], epsilon = 1e-6);
    assert_eq!(model.inference_calls(), 4);
    assert_eq!(model.nsupport(), 1);
}

#[test]
fn positive_constraint_with_warm_start() {
    let problem = PlaneProblem::new(2, vec![vec![(array![-1.0, 1.0], 1.0)]]);
    let warm: ConstraintStore<f64, usize> =
        vec![WorkingConstraint::new(vec![2], array![1.0, 1.0], 0.5)].into();

    let model = OneSlackSsvm::params()
        .positive_constraint(vec![0])
        .fit_with(warm, &problem, &problem.records(), &problem.targets())
        .unwrap();

    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_eq!(model.constraints().len(), 2);
    assert!(model.w()[0] >= -1e-6);
    assert_abs_diff_eq!(model.w(), array![0.0, 1.0], epsilon = 1e-6);
    assert_abs_diff_eq!(model.alphas()[0].sum(), 1.0, epsilon = 1e-6);

    // the same constraints without the positivity constraint drive w_0 negative
    let warm: ConstraintStore<f64, usize> =
        vec![WorkingConstraint::new(vec![2], array![1.0, 1.0], 0.5)].into();
    let free = OneSlackSsvm::params()
        .max_iter(1)
        .fit_with(warm, &problem, &problem.records(), &problem.targets())
        .unwrap();
    assert_abs_diff_eq!(free.w()[0], -0.25, epsilon = 1e-6);
}

#[test]
fn length_mismatch_before_inference() {
    let problem = two_examples();
    let res = OneSlackSsvm::params().fit(&problem, &[0, 1], &[0]);

    assert_eq!(
        res.unwrap_err(),
        SsvmError::DimensionMismatch {
            records: 2,
            targets: 1
        }
    );
    assert_eq!(problem.inference_calls(), 0);
}

/// Fails the first `failures` solves, then hands over to the ADMM solver
struct FlakySolver {
    failures: usize,
    calls: AtomicUsize,
    inner: AdmmSolver<f64>,
}

impl FlakySolver {
    fn new(failures: usize) -> Self {
        FlakySolver {
            failures,
            calls: AtomicUsize::new(0),
            inner: AdmmSolver::default(),
        }
    }
}

impl QpSolver<f64> for FlakySolver {
    fn solve_qp(&self, problem: &QpProblem<f64>) -> QpSolution<f64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            QpSolution {
                status: QpStatus::NumericalError,
                x: Array1::zeros(problem.nvariables()),
                objective: f64::NAN,
                iterations: 0,
            }
        } else {
            self.inner.solve_qp(problem)
        }
    }
}

#[test]
fn recovers_from_failed_solve() {
    let problem = two_examples();
    let solver = FlakySolver::new(1);
    let model = OneSlackSsvm::params()
        .qp_solver(&solver)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    assert_eq!(solver.calls.load(Ordering::SeqCst), 2);
    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_abs_diff_eq!(model.w(), array![0.5, 0.5], epsilon = 1e-6);
}

#[test]
fn gives_up_after_second_failure() {
    let problem = two_examples();
    let solver = FlakySolver::new(usize::MAX);
    let res = OneSlackSsvm::params()
        .qp_solver(&solver)
        .fit(&problem, &problem.records(), &problem.targets());

    assert_eq!(
        res.unwrap_err(),
        SsvmError::SolverFailure {
            status: QpStatus::NumericalError,
            nconstraints: 1
        }
    );
    assert_eq!(solver.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn inconsistent_inference() {
    let problem = PlaneProblem::new(1, vec![vec![(array![1.0], 1.0)]]).approximate();
    let (records, targets) = (problem.records(), problem.targets());

    // after the first iteration w = 0.5, the stored constraint keeps a slack of 0.5 while the
    // approximate search only finds 0.1
    let res = OneSlackSsvm::params()
        .c(0.5)
        .break_on_bad(true)
        .fit(&problem, &records, &targets);
    match res {
        Err(SsvmError::InferenceInconsistency {
            iteration,
            index,
            slack,
            old_slack,
        }) => {
            assert_eq!(iteration, 1);
            assert_eq!(index, 0);
            assert_abs_diff_eq!(slack, 0.1, epsilon = 1e-6);
            assert_abs_diff_eq!(old_slack, 0.5, epsilon = 1e-6);
        }
        other => panic!("expected inconsistent inference, got {:?}", other),
    }

    let model = OneSlackSsvm::params()
        .c(0.5)
        .fit(&problem, &records, &targets)
        .unwrap();
    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_eq!(model.iterations(), 1);
    assert_eq!(model.constraints().len(), 1);

    // without checking, the constraint is kept and only its repetition stops training
    let model = OneSlackSsvm::params()
        .c(0.5)
        .check_constraints(false)
        .fit(&problem, &records, &targets)
        .unwrap();
    assert_eq!(model.iterations(), 2);
    assert_eq!(model.constraints().len(), 2);
    assert_eq!(model.constraints().get(1).unwrap().outputs(), &[BAD]);
}

#[test]
fn objective_increases_over_iterations() {
    let problem = two_planes();
    let model = OneSlackSsvm::params()
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    assert_eq!(model.exit_reason(), ExitReason::Converged);
    assert_eq!(model.iterations(), 2);
    assert_abs_diff_eq!(model.objective_curve()[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(model.objective_curve()[1], 0.75, epsilon = 1e-6);
    assert_abs_diff_eq!(model.objective().unwrap(), 0.75, epsilon = 1e-6);
    assert_abs_diff_eq!(model.w(), array![0.5, 0.5], epsilon = 1e-6);
    assert_eq!(model.loss_curve(), &[1.0, 1.0]);
    assert_eq!(model.inference_calls(), 3);
}

#[test]
fn stops_when_objective_stalls() {
    let problem = two_planes();
    let model = OneSlackSsvm::params()
        .tol(1.0)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    assert_eq!(model.exit_reason(), ExitReason::ObjectiveConverged);
    assert_eq!(model.iterations(), 2);
    assert!(model.to_string().starts_with("Objective stalled after 2 iterations"));

    let problem = two_planes();
    let model = OneSlackSsvm::params()
        .tol(1e-3)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();
    assert_eq!(model.exit_reason(), ExitReason::Converged);
}

#[test]
fn true_loss_curve() {
    let problem = two_planes();
    let model = OneSlackSsvm::params()
        .show_loss(ShowLoss::True)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    // plain inference never prefers a wrong output here
    assert_eq!(model.loss_curve(), &[0.0, 0.0]);
    assert_eq!(model.inference_calls(), 5);
}

#[test]
fn iteration_limit() {
    let problem = two_planes();
    let model = OneSlackSsvm::params()
        .max_iter(1)
        .fit(&problem, &problem.records(), &problem.targets())
        .unwrap();

    assert_eq!(model.exit_reason(), ExitReason::MaxIterReached);
    assert_eq!(model.iterations(), 1);
    assert_eq!(model.constraints().len(), 1);
    assert_abs_diff_eq!(model.w(), array![1.0, 0.0], epsilon = 1e-6);
}

/// Three well separated blobs with a constant bias feature
fn blobs(rng: &mut SmallRng) -> (Vec<Array1<f64>>, Vec<usize>) {
    let centers = array![[0.0, 0.0], [6.0, 0.0], [0.0, 6.0]];
    let noise = Array2::random_using((30, 2), Uniform::new(-1.0, 1.0), rng);

    let records = noise
        .outer_iter()
        .enumerate()
        .map(|(i, n)| {
            let center = centers.row(i % 3);
            array![center[0] + n[0], center[1] + n[1], 1.0]
        })
        .collect();
    let targets = (0..30).map(|i| i % 3).collect();

    (records, targets)
}

#[test]
fn multi_class_blobs() {
    let mut rng = SmallRng::seed_from_u64(42);
    let (records, targets) = blobs(&mut rng);
    let problem = MultiClassProblem::new(3, 3);

    let model = OneSlackSsvm::params()
        .c(10.0)
        .fit(&problem, &records, &targets)
        .unwrap();

    assert_eq!(model.w().len(), 9);
    assert!(model.score(&problem, &records, &targets).unwrap() > 0.9);

    for alpha in model.alphas() {
        assert_abs_diff_eq!(alpha.sum(), 10.0, epsilon = 1e-5);
        assert!(alpha.iter().all(|&a| a >= -1e-6));
    }
    for pair in model.objective_curve().windows(2) {
        assert!(pair[1] >= pair[0] - 1e-6 * (1.0 + pair[0].abs()));
    }

    let (test_records, test_targets) = blobs(&mut rng);
    assert!(model.score(&problem, &test_records, &test_targets).unwrap() > 0.9);
}

#[test]
fn multi_class_blobs_single_precision() {
    let mut rng = SmallRng::seed_from_u64(42);
    let (records, targets) = blobs(&mut rng);
    let records = records
        .iter()
        .map(|x| x.mapv(|v| v as f32))
        .collect::<Vec<_>>();
    let problem = MultiClassProblem::new(3, 3);

    let model = OneSlackSsvm::params()
        .c(10.0)
        .fit(&problem, &records, &targets)
        .unwrap();

    assert!(model.iterations() > 1);
    assert!(model.score(&problem, &records, &targets).unwrap() > 0.9);
    for alpha in model.alphas() {
        assert_abs_diff_eq!(alpha.sum(), 10.0, epsilon = 1e-2);
    }
}

/// Three overlapping blobs, no weight vector separates them
fn noisy_blobs(rng: &mut SmallRng, n: usize) -> (Vec<Array1<f64>>, Vec<usize>) {
    let centers = array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]];
    let noise = Array2::random_using((n, 2), Uniform::new(-2.0, 2.0), rng);

    let records = noise
        .outer_iter()
        .enumerate()
        .map(|(i, n)| {
            let center = centers.row(i % 3);
            array![center[0] + n[0], center[1] + n[1], 1.0]
        })
        .collect();
    let targets = (0..n).map(|i| i % 3).collect();

    (records, targets)
}

#[test]
fn objective_increases_on_noisy_blobs() {
    let mut rng = SmallRng::seed_from_u64(3);
    let (records, targets) = noisy_blobs(&mut rng, 90);

    for &c in &[10.0, 100.0] {
        let problem = MultiClassProblem::new(3, 3);
        let model = OneSlackSsvm::params()
            .c(c)
            .max_iter(60)
            .fit(&problem, &records, &targets)
            .unwrap();

        assert!(model.iterations() > 5);
        assert!(model.score(&problem, &records, &targets).unwrap() < 1.0);
        for alpha in model.alphas() {
            assert_abs_diff_eq!(alpha.sum(), c, epsilon = 1e-6 * c);
        }
        for pair in model.objective_curve().windows(2) {
            assert!(
                pair[1] >= pair[0] - 1e-6 * (1.0 + pair[0].abs()),
                "objective fell from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn multi_class_on_global_pool() {
    let mut rng = SmallRng::seed_from_u64(7);
    let (records, targets) = blobs(&mut rng);
    let problem = MultiClassProblem::new(3, 3);

    let sequential = OneSlackSsvm::params()
        .max_iter(10)
        .fit(&problem, &records, &targets)
        .unwrap();
    let parallel = OneSlackSsvm::params()
        .max_iter(10)
        .n_jobs(-1)
        .fit(&problem, &records, &targets)
        .unwrap();

    assert_eq!(sequential.iterations(), parallel.iterations());
    assert_eq!(sequential.constraints(), parallel.constraints());
    assert_eq!(sequential.w(), parallel.w());
}
