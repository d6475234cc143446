//! Damped Gauss-Newton iteration
//!
//! One [`LmRun`] is one solve attempt. It owns the full coordinate vector of
//! every point; locked points keep their start coordinates and only the
//! unlocked ones move.

use cpsx_core::{CpsError, ResultCode, Result};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

use super::problem::Problem;
use crate::driver::SolveStatus;
use crate::options::SolveOptions;

/// Damping beyond which the step is considered stuck
const MAX_DAMPING: f64 = 1e32;

/// Termination state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    NotStarted,
    Running,
    /// Actual and predicted relative reductions are at most `ftol`
    RelativeReductionTooSmall,
    /// Relative step length is at most `xtol`
    RelativeErrorTooSmall,
    RelativeErrorAndReductionTooSmall,
    /// Gradient infinity norm is at most `gtol`
    CosinusTooSmall,
    /// Iteration or residual evaluation cap reached
    TooManyFunctionEvaluation,
    /// `ftol` below machine precision: no further reduction possible
    FtolTooSmall,
    /// `xtol` below machine precision: no further step possible
    XtolTooSmall,
    /// `gtol` below machine precision: gradient is orthogonal to the residuals
    GtolTooSmall,
    /// No unlocked coordinates or no costs
    ImproperInputParameters,
    /// Residuals or derivatives stopped being finite
    NumericalFailure,
}

impl LmStatus {
    pub fn solve_status(self) -> SolveStatus {
        match self {
            LmStatus::NotStarted => SolveStatus::NotStarted,
            LmStatus::Running => SolveStatus::Running,
            LmStatus::RelativeReductionTooSmall
            | LmStatus::RelativeErrorTooSmall
            | LmStatus::RelativeErrorAndReductionTooSmall
            | LmStatus::CosinusTooSmall => SolveStatus::Converged,
            LmStatus::TooManyFunctionEvaluation
            | LmStatus::FtolTooSmall
            | LmStatus::XtolTooSmall
            | LmStatus::GtolTooSmall => SolveStatus::NotConverged,
            LmStatus::ImproperInputParameters => SolveStatus::Failed(ResultCode::BadArg),
            LmStatus::NumericalFailure => SolveStatus::Failed(ResultCode::NumericalIssue),
        }
    }
}

/// State of one solve attempt
#[derive(Debug, Clone)]
pub(crate) struct LmRun {
    /// Exploration coordinates of every point, dense order
    pub full: Vec<f64>,
    /// Dense indices of the points being optimized
    pub unlocked: Vec<usize>,
    residual: DVector<f64>,
    jac: DMatrix<f64>,
    /// Marquardt scaling, running maximum of the Jacobian column norms
    diag: DVector<f64>,
    lambda: f64,
    nu: f64,
    pub status: LmStatus,
    pub iterations: u32,
    pub evaluations: u32,
}

impl LmRun {
    /// Evaluate the start point
    ///
    /// # Errors
    /// * `NumericalIssue` - the start point has non-finite costs or
    ///   derivatives
    /// * whatever the cost callbacks return
    pub fn start(
        problem: &Problem,
        full: Vec<f64>,
        unlocked: Vec<usize>,
        options: &SolveOptions,
    ) -> Result<Self> {
        let m = problem.rows();
        let n = unlocked.len() * problem.components();
        let mut run = Self {
            full,
            unlocked,
            residual: DVector::zeros(m),
            jac: DMatrix::zeros(m, n),
            diag: DVector::from_element(n, 1.0),
            lambda: options.initial_damping,
            nu: 2.0,
            status: LmStatus::Running,
            iterations: 0,
            evaluations: 0,
        };
        if m > 0 {
            run.residual = problem.residuals(&run.full)?;
            run.evaluations = 1;
        }
        if n == 0 || m == 0 {
            tracing::debug!(rows = m, cols = n, "nothing to optimize");
            run.status = LmStatus::ImproperInputParameters;
            return Ok(run);
        }

        run.jac = problem.jacobian(&run.full, &run.unlocked, options.fd_step)?;
        let mut max_diag: f64 = 0.0;
        for j in 0..n {
            let norm = run.jac.column(j).norm();
            run.diag[j] = if norm > 0.0 { norm } else { 1.0 };
            max_diag = max_diag.max(norm * norm);
        }
        if max_diag > 0.0 {
            run.lambda = options.initial_damping * max_diag;
        }
        Ok(run)
    }

    /// Sum of squared costs at the current point
    pub fn cost(&self) -> f64 {
        self.residual.norm_squared()
    }

    fn moved(&self, problem: &Problem, delta: &DVector<f64>) -> Vec<f64> {
        let ec = problem.components();
        let mut full = self.full.clone();
        for (k, u) in self.unlocked.iter().enumerate() {
            for c in 0..ec {
                full[u * ec + c] += delta[k * ec + c];
            }
        }
        full
    }

    fn scaled_norm(&self, problem: &Problem) -> f64 {
        let ec = problem.components();
        let mut sum = 0.0;
        for (k, u) in self.unlocked.iter().enumerate() {
            for c in 0..ec {
                let v = self.diag[k * ec + c] * self.full[u * ec + c];
                sum += v * v;
            }
        }
        sum.sqrt()
    }

    /// Run one iteration and return the resulting status
    ///
    /// Non-finite costs or derivatives end the run with
    /// [`LmStatus::NumericalFailure`] instead of an error.
    ///
    /// # Errors
    /// Whatever the cost, conversion or variation callbacks return besides
    /// `NumericalIssue`.
    pub fn step(&mut self, problem: &Problem, options: &SolveOptions) -> Result<LmStatus> {
        if self.status != LmStatus::Running {
            return Ok(self.status);
        }
        match self.iterate(problem, options) {
            Ok(()) => {}
            Err(CpsError::NumericalIssue { reason }) => {
                tracing::debug!(%reason, iteration = self.iterations, "numerical failure");
                self.status = LmStatus::NumericalFailure;
            }
            Err(e) => return Err(e),
        }
        if self.status == LmStatus::Running
            && (self.iterations >= options.max_iterations
                || self.evaluations >= options.max_function_evaluations)
        {
            self.status = LmStatus::TooManyFunctionEvaluation;
        }
        Ok(self.status)
    }

    fn iterate(&mut self, problem: &Problem, options: &SolveOptions) -> Result<()> {
        self.iterations += 1;
        let n = self.jac.ncols();

        let gradient = self.jac.tr_mul(&self.residual);
        let gnorm = gradient.amax();
        if gnorm <= options.gtol {
            self.status = LmStatus::CosinusTooSmall;
            return Ok(());
        }
        if gnorm <= f64::EPSILON {
            self.status = LmStatus::GtolTooSmall;
            return Ok(());
        }

        for j in 0..n {
            self.diag[j] = self.diag[j].max(self.jac.column(j).norm());
        }

        let mut normal = self.jac.tr_mul(&self.jac);
        for j in 0..n {
            normal[(j, j)] += self.lambda * self.diag[j] * self.diag[j];
        }
        let Some(chol) = Cholesky::new(normal) else {
            self.reject();
            return Ok(());
        };
        let delta = chol.solve(&(-&gradient));

        let candidate = self.moved(problem, &delta);
        let residual = problem.residuals(&candidate)?;
        self.evaluations += 1;

        let f = 0.5 * self.residual.norm_squared();
        let f_new = 0.5 * residual.norm_squared();
        let damped = delta.component_mul(&self.diag).component_mul(&self.diag) * self.lambda;
        let predicted = 0.5 * delta.dot(&(damped - &gradient));
        let actual = f - f_new;
        let rho = if predicted > 0.0 { actual / predicted } else { -1.0 };

        let xnorm = self.scaled_norm(problem);
        let dnorm = delta.component_mul(&self.diag).norm();
        let (actual_rel, predicted_rel) = if f > 0.0 {
            (actual / f, predicted / f)
        } else {
            (0.0, 0.0)
        };

        if rho > 0.0 {
            self.full = candidate;
            self.residual = residual;
            self.jac = problem.jacobian(&self.full, &self.unlocked, options.fd_step)?;
            self.lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3));
            self.nu = 2.0;

            let reduced = actual_rel.abs() <= options.ftol && predicted_rel <= options.ftol;
            let small_step = dnorm <= options.xtol * xnorm;
            self.status = match (reduced, small_step) {
                (true, true) => LmStatus::RelativeErrorAndReductionTooSmall,
                (true, false) => LmStatus::RelativeReductionTooSmall,
                (false, true) => LmStatus::RelativeErrorTooSmall,
                (false, false) if f_new == 0.0 => LmStatus::RelativeReductionTooSmall,
                (false, false) => LmStatus::Running,
            };
        } else {
            self.reject();
        }

        if self.status == LmStatus::Running {
            if actual_rel.abs() <= f64::EPSILON && predicted_rel <= f64::EPSILON && rho <= 2.0 {
                self.status = LmStatus::FtolTooSmall;
            } else if dnorm <= f64::EPSILON * xnorm || self.lambda > MAX_DAMPING {
                self.status = LmStatus::XtolTooSmall;
            }
        }
        tracing::debug!(
            iteration = self.iterations,
            cost = self.cost(),
            lambda = self.lambda,
            rho,
            "lm iteration"
        );
        Ok(())
    }

    fn reject(&mut self) {
        self.lambda *= self.nu;
        self.nu *= 2.0;
        if self.lambda > MAX_DAMPING {
            self.status = LmStatus::XtolTooSmall;
        }
    }
}
