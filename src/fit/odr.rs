//! Orthogonal distance regression.
//!
//! Unknowns are the parameters `β` and one abscissa correction `δ_i` per
//! point. The objective is
//!
//! ```text
//! S(β, δ) = Σ wy_i (y_i - f(x_i + δ_i; β))² + wx_i δ_i²
//! ```
//!
//! Each Levenberg–Marquardt step is linearized around the current `(β, δ)`.
//! Because every `δ_i` touches one residual only, the `δ` block of the normal
//! equations is diagonal and is eliminated analytically, leaving a `p × p`
//! system for `Δβ` (the Schur complement). With `D_i = ∂f/∂x`, `J_i = ∂f/∂β`
//! and `ε_i` the current y-residual:
//!
//! ```text
//! E_i = wy_i D_i² + wx_i + λ m_i
//! c_i = (wx_i + λ m_i) / E_i
//! (Σ wy_i c_i J_i J_iᵀ + λ M) Δβ = Σ wy_i J_i (c_i ε_i + D_i wx_i δ_i / E_i)
//! Δδ_i = (wy_i D_i (ε_i - J_i·Δβ) - wx_i δ_i) / E_i
//! ```
//!
//! Points whose `σx` is effectively zero keep `δ_i = 0` (they enter with
//! `c_i = 1`, i.e. as ordinary least-squares rows).

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitDiagnostics, FitMethod};
use crate::error::{LabFitError, Result};
use crate::fit::lm::{errors_from_covariance, fit_weighted};
use crate::fit::progress::FitProgress;
use crate::fit::{Estimate, Estimator, FitProblem, base_weights};
use crate::math::invert_normal_matrix;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const FTOL: f64 = 1e-14;
const XTOL: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default)]
pub struct OdrEstimator;

impl Estimator for OdrEstimator {
    fn method(&self) -> FitMethod {
        FitMethod::Odr
    }

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
        progress.start(problem.max_iter);
        let eps = problem.opts.sigma_zero_eps;
        let wy = base_weights(problem.sigma_y);
        let wx: Vec<Option<f64>> = problem
            .sigma_x
            .iter()
            .map(|s| (s.abs() > eps).then(|| 1.0 / (s * s)))
            .collect();

        if wx.iter().all(Option::is_none) {
            log::debug!("odr: no usable σx, solving as weighted least squares");
            return fit_weighted(problem, &wy, Some(progress));
        }
        solve(problem, &wy, &wx, progress)
    }
}

/// Current state of the joint problem.
struct State {
    beta: Vec<f64>,
    delta: Vec<f64>,
    cost: f64,
}

fn cost_at(problem: &FitProblem<'_>, wy: &[f64], wx: &[Option<f64>], beta: &[f64], delta: &[f64]) -> f64 {
    let xd = shifted(problem.x, delta);
    let f = problem.model.evaluate(beta, &xd);
    let mut s = 0.0;
    for i in 0..problem.n() {
        s += wy[i] * (problem.y[i] - f[i]).powi(2);
        if let Some(w) = wx[i] {
            s += w * delta[i] * delta[i];
        }
    }
    s
}

fn shifted(x: &[f64], delta: &[f64]) -> Vec<f64> {
    x.iter().zip(delta).map(|(x, d)| x + d).collect()
}

/// Linearization at one `(β, δ)`.
struct Linearization {
    jac: DMatrix<f64>,
    slope: Vec<f64>,
    resid: Vec<f64>,
}

fn linearize(problem: &FitProblem<'_>, beta: &[f64], delta: &[f64]) -> Linearization {
    let xd = shifted(problem.x, delta);
    let f = problem.model.evaluate(beta, &xd);
    Linearization {
        jac: problem.model.jacobian(beta, &xd),
        slope: problem.model.x_slope(beta, &xd),
        resid: problem.y.iter().zip(&f).map(|(y, f)| y - f).collect(),
    }
}

/// Schur-complement matrix `Σ wy c J Jᵀ` at `λ = 0`.
fn reduced_normal_matrix(lin: &Linearization, wy: &[f64], wx: &[Option<f64>], p: usize) -> DMatrix<f64> {
    let mut a = DMatrix::<f64>::zeros(p, p);
    for i in 0..lin.resid.len() {
        let c = match wx[i] {
            Some(w) => w / (wy[i] * lin.slope[i].powi(2) + w),
            None => 1.0,
        };
        for r in 0..p {
            for s in 0..p {
                a[(r, s)] += wy[i] * c * lin.jac[(i, r)] * lin.jac[(i, s)];
            }
        }
    }
    a
}

fn solve(problem: &FitProblem<'_>, wy: &[f64], wx: &[Option<f64>], progress: &FitProgress) -> Result<Estimate> {
    let n = problem.n();
    let p = problem.p();

    let beta = problem.initial.to_vec();
    let delta = vec![0.0; n];
    let cost = cost_at(problem, wy, wx, &beta, &delta);
    if !cost.is_finite() {
        return Err(LabFitError::Numerical(
            "the model is not finite at the initial parameters".to_string(),
        ));
    }
    let mut state = State { beta, delta, cost };

    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0;
    let mut converged = state.cost == 0.0;

    while !converged && iterations < problem.max_iter {
        iterations += 1;
        progress.advance();

        let lin = linearize(problem, &state.beta, &state.delta);
        let base = reduced_normal_matrix(&lin, wy, wx, p);
        let scale: Vec<f64> = (0..p).map(|j| base[(j, j)].max(1e-12)).collect();

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut a = DMatrix::<f64>::zeros(p, p);
            let mut rhs = DVector::<f64>::zeros(p);
            let mut e = vec![0.0; n];
            for i in 0..n {
                let d = lin.slope[i];
                let (c, shift) = match wx[i] {
                    Some(w) => {
                        let damp = lambda * w;
                        e[i] = wy[i] * d * d + w + damp;
                        ((w + damp) / e[i], d * w * state.delta[i] / e[i])
                    }
                    None => (1.0, 0.0),
                };
                for r in 0..p {
                    let jr = lin.jac[(i, r)];
                    rhs[r] += wy[i] * jr * (c * lin.resid[i] + shift);
                    for s in 0..p {
                        a[(r, s)] += wy[i] * c * jr * lin.jac[(i, s)];
                    }
                }
            }
            for j in 0..p {
                a[(j, j)] += lambda * scale[j];
            }

            let Some(step) = a.cholesky().map(|ch| ch.solve(&rhs)) else {
                lambda *= 10.0;
                continue;
            };

            let mut candidate_delta = state.delta.clone();
            for i in 0..n {
                if let Some(w) = wx[i] {
                    let jd: f64 = (0..p).map(|r| lin.jac[(i, r)] * step[r]).sum();
                    let d = lin.slope[i];
                    candidate_delta[i] += (wy[i] * d * (lin.resid[i] - jd) - w * state.delta[i]) / e[i];
                }
            }
            let candidate_beta: Vec<f64> = state.beta.iter().zip(step.iter()).map(|(b, s)| b + s).collect();
            let new_cost = cost_at(problem, wy, wx, &candidate_beta, &candidate_delta);

            if new_cost.is_finite() && new_cost <= state.cost {
                let step_norm = step.norm();
                let beta_norm = state.beta.iter().map(|v| v * v).sum::<f64>().sqrt();
                let rel_drop = (state.cost - new_cost) / state.cost.max(f64::MIN_POSITIVE);

                state = State {
                    beta: candidate_beta,
                    delta: candidate_delta,
                    cost: new_cost,
                };
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;
                if state.cost == 0.0 || rel_drop <= FTOL || step_norm <= XTOL * (beta_norm + XTOL) {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            log::debug!("odr: damping exhausted after {iterations} iterations; cost={:.6e}", state.cost);
            converged = true;
        }
    }

    if !converged {
        log::warn!(
            "ODR did not converge within {} iterations (cost={:.6e})",
            problem.max_iter,
            state.cost
        );
    }

    let covariance = if n > p {
        let lin = linearize(problem, &state.beta, &state.delta);
        let a = reduced_normal_matrix(&lin, wy, wx, p);
        let inv = invert_normal_matrix(&a).ok_or_else(|| {
            LabFitError::Singular(
                "the ODR normal matrix cannot be inverted; parameters may be redundant".to_string(),
            )
        })?;
        Some(inv * (state.cost / (n - p) as f64))
    } else {
        None
    };
    let errors = errors_from_covariance(covariance.as_ref(), p);

    Ok(Estimate {
        values: state.beta,
        errors,
        covariance,
        diagnostics: FitDiagnostics {
            iterations,
            converged,
            ..FitDiagnostics::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitOptions;
    use crate::expr::compile_equation;
    use approx::assert_relative_eq;

    fn problem<'a>(
        x: &'a [f64],
        y: &'a [f64],
        sx: &'a [f64],
        sy: &'a [f64],
        model: &'a crate::expr::CompiledModel,
        initial: &'a [f64],
        opts: &'a FitOptions,
    ) -> FitProblem<'a> {
        FitProblem {
            x,
            y,
            sigma_x: sx,
            sigma_y: sy,
            model,
            initial,
            max_iter: 200,
            opts,
        }
    }

    #[test]
    fn recovers_exact_line_with_sigma_x() {
        let model = compile_equation("a*x").unwrap();
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let s = [0.1; 5];
        let opts = FitOptions::default();
        let est = OdrEstimator
            .fit(&problem(&x, &y, &s, &s, &model, &[1.0], &opts), &FitProgress::new())
            .unwrap();
        assert_relative_eq!(est.values[0], 2.0, epsilon = 1e-8);
        assert!(est.diagnostics.converged);
    }

    #[test]
    fn scattered_data_stays_near_true_slope() {
        let model = compile_equation("a*x + b").unwrap();
        let x: Vec<f64> = (1..=10).map(f64::from).collect();
        let wiggle = [0.08, -0.05, 0.03, -0.09, 0.06, -0.02, 0.07, -0.04, 0.01, -0.05];
        let y: Vec<f64> = x.iter().zip(wiggle).map(|(x, w)| 2.0 * x + 1.0 + w).collect();
        let sx = vec![0.05; 10];
        let sy = vec![0.1; 10];
        let opts = FitOptions::default();
        let est = OdrEstimator
            .fit(&problem(&x, &y, &sx, &sy, &model, &[1.0, 0.0], &opts), &FitProgress::new())
            .unwrap();
        assert_relative_eq!(est.values[0], 2.0, epsilon = 0.05);
        assert_relative_eq!(est.values[1], 1.0, epsilon = 0.2);
        assert!(est.errors.iter().all(|e| e.is_finite() && *e > 0.0));
        assert!(est.covariance.is_some());
    }

    #[test]
    fn zero_sigma_x_matches_least_squares() {
        let model = compile_equation("a*x + b").unwrap();
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.1, 2.9, 5.2, 6.8];
        let sx = [0.0; 4];
        let sy = [0.2; 4];
        let opts = FitOptions::default();
        let prob = problem(&x, &y, &sx, &sy, &model, &[1.0, 0.0], &opts);
        let odr = OdrEstimator.fit(&prob, &FitProgress::new()).unwrap();
        let ls = crate::fit::LeastSquaresEstimator.fit(&prob, &FitProgress::new()).unwrap();
        assert_relative_eq!(odr.values[0], ls.values[0], epsilon = 1e-10);
        assert_relative_eq!(odr.values[1], ls.values[1], epsilon = 1e-10);
    }

    #[test]
    fn progress_counts_iterations() {
        let model = compile_equation("a*x").unwrap();
        let x = [1.0, 2.0, 3.0];
        let y = [2.1, 3.9, 6.05];
        let s = [0.1; 3];
        let opts = FitOptions::default();
        let progress = FitProgress::new();
        let est = OdrEstimator
            .fit(&problem(&x, &y, &s, &s, &model, &[1.0], &opts), &progress)
            .unwrap();
        assert_eq!(progress.step(), est.diagnostics.iterations);
        assert!(progress.snapshot().total >= est.diagnostics.iterations);
    }
}
