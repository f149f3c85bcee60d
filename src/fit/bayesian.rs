//! Posterior sampling with random-walk Metropolis.
//!
//! Flat prior, Gaussian likelihood. The noise level is `σy` when every `σy` is
//! positive, otherwise the residual scale of the least-squares fit. The chain
//! starts at the least-squares optimum with a proposal shaped by its
//! covariance; the step size is tuned during burn-in only, so retained samples
//! come from a fixed kernel.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::domain::FitMethod;
use crate::error::{LabFitError, Result};
use crate::fit::lm::fit_weighted;
use crate::fit::progress::FitProgress;
use crate::fit::{Estimate, Estimator, FitProblem, base_weights};
use crate::math::{cholesky_lower, sample_moments};

const ADAPT_WINDOW: usize = 50;
const TARGET_LOW: f64 = 0.15;
const TARGET_HIGH: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default)]
pub struct BayesianEstimator;

impl Estimator for BayesianEstimator {
    fn method(&self) -> FitMethod {
        FitMethod::Bayesian
    }

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
        let opts = problem.opts;
        let samples = opts.bayesian_samples;
        if samples < 2 {
            return Err(LabFitError::Validation(
                "at least 2 posterior samples are required".to_string(),
            ));
        }
        let burn_in = opts.bayesian_burn_in.unwrap_or(samples / 2);
        progress.start(burn_in + samples);

        let w = base_weights(problem.sigma_y);
        let start = fit_weighted(problem, &w, None)?;
        let sigma = noise_scale(problem, &start.values);
        let p = problem.p();

        let chol = proposal_factor(start.covariance.as_ref(), &start.values, p);
        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut step_scale = 1.0;

        let mut current = start.values.clone();
        let mut current_ll = log_likelihood(problem, &current, &sigma);
        if !current_ll.is_finite() {
            return Err(LabFitError::Numerical(
                "the likelihood is not finite at the least-squares optimum".to_string(),
            ));
        }

        let mut draws = Vec::with_capacity(samples);
        let mut window_accepted = 0;
        let mut retained_accepted = 0;

        for step in 0..burn_in + samples {
            progress.advance();
            let z = DVector::from_fn(p, |_, _| rng.sample::<f64, _>(StandardNormal));
            let jump = &chol * z * step_scale;
            let proposal: Vec<f64> = current.iter().zip(jump.iter()).map(|(c, j)| c + j).collect();
            let proposal_ll = log_likelihood(problem, &proposal, &sigma);

            let accept = proposal_ll.is_finite() && {
                let u: f64 = rng.r#gen();
                u.ln() < proposal_ll - current_ll
            };
            if accept {
                current = proposal;
                current_ll = proposal_ll;
            }

            if step < burn_in {
                window_accepted += usize::from(accept);
                if (step + 1) % ADAPT_WINDOW == 0 {
                    let rate = window_accepted as f64 / ADAPT_WINDOW as f64;
                    if rate < TARGET_LOW {
                        step_scale *= 0.7;
                    } else if rate > TARGET_HIGH {
                        step_scale *= 1.3;
                    }
                    window_accepted = 0;
                }
            } else {
                retained_accepted += usize::from(accept);
                draws.push(current.clone());
            }
        }

        let acceptance_rate = retained_accepted as f64 / samples as f64;
        log::debug!("bayesian: acceptance rate {acceptance_rate:.3}, step scale {step_scale:.3}");
        if acceptance_rate == 0.0 {
            log::warn!("Metropolis chain never moved; posterior errors will be zero");
        }

        let (mean, errors, covariance) = sample_moments(&draws, p);
        let mut diagnostics = start.diagnostics;
        diagnostics.iterations = burn_in + samples;
        diagnostics.acceptance_rate = Some(acceptance_rate);

        Ok(Estimate {
            values: mean,
            errors,
            covariance: Some(covariance),
            diagnostics,
        })
    }
}

/// Per-point noise level used by the likelihood.
fn noise_scale(problem: &FitProblem<'_>, best: &[f64]) -> Vec<f64> {
    if problem.sigma_y.iter().all(|s| *s > 0.0) {
        return problem.sigma_y.to_vec();
    }
    let n = problem.n();
    let p = problem.p();
    let f = problem.model.evaluate(best, problem.x);
    let sse: f64 = problem.y.iter().zip(&f).map(|(y, f)| (y - f).powi(2)).sum();
    let dof = if n > p { n - p } else { n };
    let y_scale = problem.y.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let s = (sse / dof as f64).sqrt().max(1e-9 * y_scale.max(1.0));
    vec![s; n]
}

fn log_likelihood(problem: &FitProblem<'_>, params: &[f64], sigma: &[f64]) -> f64 {
    let f = problem.model.evaluate(params, problem.x);
    let chi2: f64 = problem
        .y
        .iter()
        .zip(&f)
        .zip(sigma)
        .map(|((y, f), s)| ((y - f) / s).powi(2))
        .sum();
    -0.5 * chi2
}

/// Cholesky factor of `2.38²/p · Σ`; diagonal fallback when `Σ` is unusable.
fn proposal_factor(cov: Option<&DMatrix<f64>>, best: &[f64], p: usize) -> DMatrix<f64> {
    let factor = 2.38 * 2.38 / p as f64;
    if let Some(l) = cov.and_then(|c| cholesky_lower(&(c * factor))) {
        if l.iter().all(|v| v.is_finite()) {
            return l;
        }
    }
    log::warn!("bayesian: least-squares covariance unusable, falling back to a diagonal proposal");
    let diag: Vec<f64> = best
        .iter()
        .map(|b| (0.01 * b.abs()).max(1e-6) * factor.sqrt())
        .collect();
    DMatrix::from_diagonal(&DVector::from_vec(diag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitOptions;
    use crate::fit::test_support::{line_model, noisy_line};
    use approx::assert_relative_eq;

    fn run(opts: &FitOptions) -> Estimate {
        let (x, y) = noisy_line(12);
        let sx = vec![0.0; x.len()];
        let sy = vec![0.05; x.len()];
        let model = line_model();
        let problem = FitProblem {
            x: &x,
            y: &y,
            sigma_x: &sx,
            sigma_y: &sy,
            model: &model,
            initial: &[1.0, 0.0],
            max_iter: 100,
            opts,
        };
        BayesianEstimator.fit(&problem, &FitProgress::new()).unwrap()
    }

    #[test]
    fn posterior_centres_on_true_line() {
        let opts = FitOptions {
            bayesian_samples: 2000,
            ..FitOptions::default()
        };
        let est = run(&opts);
        assert_relative_eq!(est.values[0], 2.0, epsilon = 0.02);
        assert_relative_eq!(est.values[1], 1.0, epsilon = 0.1);
        let rate = est.diagnostics.acceptance_rate.unwrap();
        assert!(rate > 0.05 && rate < 0.95, "acceptance rate {rate}");
        assert!(est.errors.iter().all(|e| *e > 0.0 && *e < 0.2));
    }

    #[test]
    fn chain_is_reproducible_for_a_seed() {
        let opts = FitOptions {
            bayesian_samples: 300,
            seed: 11,
            ..FitOptions::default()
        };
        assert_eq!(run(&opts).values, run(&opts).values);
    }

    #[test]
    fn too_few_samples_is_rejected() {
        let (x, y) = noisy_line(4);
        let zeros = vec![0.0; 4];
        let model = line_model();
        let opts = FitOptions {
            bayesian_samples: 1,
            ..FitOptions::default()
        };
        let problem = FitProblem {
            x: &x,
            y: &y,
            sigma_x: &zeros,
            sigma_y: &zeros,
            model: &model,
            initial: &[1.0, 0.0],
            max_iter: 100,
            opts: &opts,
        };
        let err = BayesianEstimator.fit(&problem, &FitProgress::new()).unwrap_err();
        assert!(matches!(err, LabFitError::Validation(_)));
    }
}
