//! Levenberg–Marquardt for weighted nonlinear least squares.
//!
//! Each step solves the damped, row-scaled system
//!
//! ```text
//! [ sqrt(W) J ]       [ sqrt(W) r ]
//! [ sqrt(λ) D ] δ  =  [     0     ]
//! ```
//!
//! with the SVD solver from `math::ols`, where `D` is the Marquardt scaling
//! `sqrt(diag(JᵀWJ))`.

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitDiagnostics, FitMethod};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;
use crate::fit::progress::FitProgress;
use crate::fit::{Estimate, Estimator, FitProblem, base_weights};
use crate::math::{invert_normal_matrix, solve_least_squares};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const FTOL: f64 = 1e-14;
const XTOL: f64 = 1e-12;

/// Outcome of one weighted least-squares solve.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    /// Weighted sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub(crate) fn weighted_cost(model: &CompiledModel, params: &[f64], x: &[f64], y: &[f64], w: &[f64]) -> f64 {
    model
        .evaluate(params, x)
        .iter()
        .zip(y)
        .zip(w)
        .map(|((f, yi), wi)| wi * (yi - f).powi(2))
        .sum()
}

/// Minimize `Σ w_i (y_i - f(x_i; β))²` starting from `initial`.
pub fn levenberg_marquardt(
    model: &CompiledModel,
    x: &[f64],
    y: &[f64],
    w: &[f64],
    initial: &[f64],
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<LmOutcome> {
    let n = x.len();
    let p = initial.len();
    let sqrt_w: Vec<f64> = w.iter().map(|v| v.sqrt()).collect();

    let mut beta = initial.to_vec();
    let mut cost = weighted_cost(model, &beta, x, y, w);
    if !cost.is_finite() {
        return Err(LabFitError::Numerical(
            "the model is not finite at the initial parameters".to_string(),
        ));
    }

    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0;
    let mut converged = cost == 0.0;

    while !converged && iterations < max_iter {
        iterations += 1;
        if let Some(progress) = progress {
            progress.advance();
        }

        let jac = model.jacobian(&beta, x);
        let f = model.evaluate(&beta, x);
        let mut scale = vec![0.0; p];
        for j in 0..p {
            let col_norm: f64 = (0..n).map(|i| w[i] * jac[(i, j)].powi(2)).sum();
            scale[j] = col_norm.sqrt().max(1e-12);
        }

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut a = DMatrix::<f64>::zeros(n + p, p);
            let mut b = DVector::<f64>::zeros(n + p);
            for i in 0..n {
                for j in 0..p {
                    a[(i, j)] = sqrt_w[i] * jac[(i, j)];
                }
                b[i] = sqrt_w[i] * (y[i] - f[i]);
            }
            let damping = lambda.sqrt();
            for j in 0..p {
                a[(n + j, j)] = damping * scale[j];
            }

            let Some(delta) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                continue;
            };
            let candidate: Vec<f64> = beta.iter().zip(delta.iter()).map(|(b, d)| b + d).collect();
            let new_cost = weighted_cost(model, &candidate, x, y, w);

            if new_cost.is_finite() && new_cost <= cost {
                let step_norm = delta.norm();
                let beta_norm = beta.iter().map(|v| v * v).sum::<f64>().sqrt();
                let rel_drop = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);

                beta = candidate;
                cost = new_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;

                if cost == 0.0 || rel_drop <= FTOL || step_norm <= XTOL * (beta_norm + XTOL) {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            // No damped step lowers the cost: already at a minimum to working precision.
            log::debug!("lm: damping exhausted after {iterations} iterations; cost={cost:.6e}");
            converged = true;
        }
    }

    if !converged {
        log::warn!("least squares did not converge within {max_iter} iterations (cost={cost:.6e})");
    }

    Ok(LmOutcome {
        params: beta,
        cost,
        iterations,
        converged,
    })
}

/// `(JᵀWJ)⁻¹ · cost/(n-p)`; `Ok(None)` when `n == p`.
pub fn scaled_covariance(
    model: &CompiledModel,
    x: &[f64],
    w: &[f64],
    params: &[f64],
    cost: f64,
) -> Result<Option<DMatrix<f64>>> {
    let n = x.len();
    let p = params.len();
    if n <= p {
        return Ok(None);
    }
    let jac = model.jacobian(params, x);
    let mut jtwj = DMatrix::<f64>::zeros(p, p);
    for i in 0..n {
        for a in 0..p {
            for b in 0..p {
                jtwj[(a, b)] += w[i] * jac[(i, a)] * jac[(i, b)];
            }
        }
    }
    let inv = invert_normal_matrix(&jtwj).ok_or_else(|| {
        LabFitError::Singular(
            "the normal matrix JᵀWJ cannot be inverted; parameters may be redundant or not constrained by the data"
                .to_string(),
        )
    })?;
    let res_var = cost / (n - p) as f64;
    Ok(Some(inv * res_var))
}

/// Standard errors from a covariance matrix (NaN when absent).
pub fn errors_from_covariance(cov: Option<&DMatrix<f64>>, p: usize) -> Vec<f64> {
    match cov {
        Some(c) => (0..p).map(|j| c[(j, j)].max(0.0).sqrt()).collect(),
        None => vec![f64::NAN; p],
    }
}

/// Plain weighted least squares (σy weights; σx ignored).
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquaresEstimator;

impl Estimator for LeastSquaresEstimator {
    fn method(&self) -> FitMethod {
        FitMethod::LeastSquares
    }

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
        progress.start(problem.max_iter);
        let w = base_weights(problem.sigma_y);
        fit_weighted(problem, &w, Some(progress))
    }
}

/// Run LM with explicit weights and attach the scaled covariance.
pub(crate) fn fit_weighted(problem: &FitProblem<'_>, w: &[f64], progress: Option<&FitProgress>) -> Result<Estimate> {
    let outcome = levenberg_marquardt(
        problem.model,
        problem.x,
        problem.y,
        w,
        problem.initial,
        problem.max_iter,
        progress,
    )?;
    let covariance = scaled_covariance(problem.model, problem.x, w, &outcome.params, outcome.cost)?;
    let errors = errors_from_covariance(covariance.as_ref(), outcome.params.len());
    Ok(Estimate {
        values: outcome.params,
        errors,
        covariance,
        diagnostics: FitDiagnostics {
            iterations: outcome.iterations,
            converged: outcome.converged,
            ..FitDiagnostics::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compile_equation;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exponential_decay() {
        let model = compile_equation("a*exp(-k*x)").unwrap();
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let w = vec![1.0; x.len()];
        let out = levenberg_marquardt(&model, &x, &y, &w, &[1.0, 0.1], 200, None).unwrap();
        assert!(out.converged);
        assert_relative_eq!(out.params[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(out.params[1], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn covariance_is_none_for_exactly_determined_fit() {
        let model = compile_equation("a*x + b").unwrap();
        let cov = scaled_covariance(&model, &[1.0, 2.0], &[1.0, 1.0], &[1.0, 0.0], 0.0).unwrap();
        assert!(cov.is_none());
        assert!(errors_from_covariance(None, 2).iter().all(|e| e.is_nan()));
    }

    #[test]
    fn redundant_parameters_are_singular() {
        let model = compile_equation("a*b*x").unwrap();
        let err = scaled_covariance(&model, &[1.0, 2.0, 3.0], &[1.0; 3], &[1.0, 1.0], 0.1).unwrap_err();
        assert!(matches!(err, LabFitError::Singular(_)));
    }
}
