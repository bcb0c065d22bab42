use crate::Float;
use linfa_linalg::cholesky::CholeskyInplace;
use linfa_linalg::triangular::{SolveTriangularInplace, UPLO};
use linfa_linalg::LinalgError;
use ndarray::{Array1, Array2, Axis};

/// Cholesky factor `L` of a symmetric positive definite matrix `M = L L^T`
#[derive(Debug, Clone)]
pub(crate) struct CholeskyFactor<F> {
    lower: Array2<F>,
}

impl<F: Float> CholeskyFactor<F> {
    pub fn new(matrix: Array2<F>) -> Result<Self, LinalgError> {
        Ok(CholeskyFactor {
            lower: matrix.cholesky_into()?,
        })
    }

    /// Overwrite `rhs` with the solution of `M X = rhs`
    pub fn solve_inplace(&self, rhs: &mut Array2<F>) -> Result<(), LinalgError> {
        self.lower.solve_triangular_inplace(rhs, UPLO::Lower)?;
        self.lower.t().solve_triangular_inplace(rhs, UPLO::Upper)?;
        Ok(())
    }

    pub fn solve(&self, rhs: &Array1<F>) -> Result<Array1<F>, LinalgError> {
        let mut rhs = rhs.clone().insert_axis(Axis(1));
        self.solve_inplace(&mut rhs)?;
        Ok(rhs.index_axis_move(Axis(1), 0))
    }
}

/// Factorization of the regularized saddle point system
///
/// ```text
/// [ P + delta I   A^T      ] [x]   [r]
/// [ A             -delta I ] [y] = [s]
/// ```
///
/// With `K = P + delta I` the multipliers solve `(A K^-1 A^T + delta I) y = A K^-1 r - s` and the
/// primal part follows as `x = K^-1 (r - A^T y)`. Both blocks are positive definite whenever `P`
/// is positive semi-definite.
#[derive(Debug, Clone)]
pub(crate) struct KktFactor<F> {
    rows: Array2<F>,
    primal: CholeskyFactor<F>,
    /// `K^-1 A^T`
    k_inv_at: Array2<F>,
    /// Factor of the Schur complement, absent without constraint rows
    schur: Option<CholeskyFactor<F>>,
}

impl<F: Float> KktFactor<F> {
    pub fn new(p: &Array2<F>, rows: Array2<F>, delta: F) -> Result<Self, LinalgError> {
        let mut k = p.clone();
        k.diag_mut().mapv_inplace(|v| v + delta);
        let primal = CholeskyFactor::new(k)?;

        let mut k_inv_at = rows.t().as_standard_layout().into_owned();
        let schur = if rows.nrows() > 0 {
            primal.solve_inplace(&mut k_inv_at)?;
            let mut schur = rows.dot(&k_inv_at);
            schur.diag_mut().mapv_inplace(|v| v + delta);
            Some(CholeskyFactor::new(schur)?)
        } else {
            None
        };

        Ok(KktFactor {
            rows,
            primal,
            k_inv_at,
            schur,
        })
    }

    pub fn rows(&self) -> &Array2<F> {
        &self.rows
    }

    pub fn solve(
        &self,
        r: &Array1<F>,
        s: &Array1<F>,
    ) -> Result<(Array1<F>, Array1<F>), LinalgError> {
        let u = self.primal.solve(r)?;
        match &self.schur {
            Some(schur) => {
                let y = schur.solve(&(self.rows.dot(&u) - s))?;
                let x = u - self.k_inv_at.dot(&y);
                Ok((x, y))
            }
            None => Ok((u, Array1::zeros(0))),
        }
    }
}
