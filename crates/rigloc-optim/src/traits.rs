use nalgebra::{DMatrix, DVector};
use rigloc_core::Real;

/// Dense non-linear least squares problem.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real>;
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// The LM backend caps evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
    pub xtol: Real,
    /// Log a per-solve summary at debug level.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub iterations: usize,
    /// Cost at the start, `0.5 * ||r||^2`.
    pub initial_cost: Real,
    /// Cost at the returned parameters, `0.5 * ||r||^2`.
    pub final_cost: Real,
    pub converged: bool,
    /// Human-readable termination reason reported by the backend.
    pub termination: String,
}

impl SolveReport {
    /// Finite cost that either converged or did not grow.
    pub fn is_usable(&self) -> bool {
        self.final_cost.is_finite() && (self.converged || self.final_cost <= self.initial_cost)
    }
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
