//! Bootstrap uncertainties.
//!
//! Parameter values come from the full-data least-squares fit. Errors and
//! covariance come from the spread of refits over `B` resampled data sets,
//! each drawn by sampling `(x, y, σx, σy)` rows with replacement.
//!
//! Resamples run in parallel. Each one seeds its own generator from
//! `(seed, index)`, so the result does not depend on the thread schedule.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::domain::FitMethod;
use crate::error::{LabFitError, Result};
use crate::fit::lm::{fit_weighted, levenberg_marquardt};
use crate::fit::progress::FitProgress;
use crate::fit::{Estimate, Estimator, FitProblem, base_weights};
use crate::math::sample_moments;

/// Spreads per-resample seeds across the `u64` range.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapEstimator;

impl Estimator for BootstrapEstimator {
    fn method(&self) -> FitMethod {
        FitMethod::Bootstrap
    }

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
        let samples = problem.opts.bootstrap_samples;
        progress.start(samples + 1);

        let w = base_weights(problem.sigma_y);
        let full = fit_weighted(problem, &w, None)?;
        progress.advance();

        let draws: Vec<Vec<f64>> = (0..samples)
            .into_par_iter()
            .filter_map(|b| {
                let draw = resample_fit(problem, &full.values, b);
                progress.advance();
                draw
            })
            .collect();

        let dropped = samples - draws.len();
        if dropped > 0 {
            log::warn!("bootstrap: {dropped} of {samples} resamples failed and were dropped");
        }
        if draws.len() < 2 {
            return Err(LabFitError::Numerical(format!(
                "only {} of {samples} bootstrap resamples could be fitted",
                draws.len()
            )));
        }

        let p = problem.p();
        let (_, errors, covariance) = sample_moments(&draws, p);
        let mut diagnostics = full.diagnostics;
        diagnostics.resamples_used = Some(draws.len());

        Ok(Estimate {
            values: full.values,
            errors,
            covariance: Some(covariance),
            diagnostics,
        })
    }
}

/// Refit on resample `b`; `None` when the fit fails or is not finite.
fn resample_fit(problem: &FitProblem<'_>, start: &[f64], b: usize) -> Option<Vec<f64>> {
    let n = problem.n();
    let seed = problem.opts.seed.wrapping_add((b as u64).wrapping_mul(SEED_STRIDE));
    let mut rng = StdRng::seed_from_u64(seed);

    let picks: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    let x: Vec<f64> = picks.iter().map(|&i| problem.x[i]).collect();
    let y: Vec<f64> = picks.iter().map(|&i| problem.y[i]).collect();
    let sigma_y: Vec<f64> = picks.iter().map(|&i| problem.sigma_y[i]).collect();
    let w = base_weights(&sigma_y);

    match levenberg_marquardt(problem.model, &x, &y, &w, start, problem.max_iter, None) {
        Ok(fit) if fit.params.iter().all(|v| v.is_finite()) => Some(fit.params),
        Ok(_) => None,
        Err(err) => {
            log::debug!("bootstrap resample {b} failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitOptions;
    use crate::fit::test_support::{line_model, noisy_line};
    use approx::assert_relative_eq;

    fn run(opts: &FitOptions) -> Estimate {
        let (x, y) = noisy_line(12);
        let zeros = vec![0.0; x.len()];
        let model = line_model();
        let problem = FitProblem {
            x: &x,
            y: &y,
            sigma_x: &zeros,
            sigma_y: &zeros,
            model: &model,
            initial: &[1.0, 0.0],
            max_iter: 100,
            opts,
        };
        BootstrapEstimator.fit(&problem, &FitProgress::new()).unwrap()
    }

    #[test]
    fn values_match_full_fit_and_errors_are_small() {
        let opts = FitOptions {
            bootstrap_samples: 200,
            ..FitOptions::default()
        };
        let est = run(&opts);
        assert_relative_eq!(est.values[0], 2.0, epsilon = 0.02);
        assert_relative_eq!(est.values[1], 1.0, epsilon = 0.1);
        assert!(est.errors.iter().all(|e| e.is_finite() && *e < 0.2));
        assert_eq!(est.diagnostics.resamples_used, Some(200));
    }

    #[test]
    fn same_seed_gives_same_errors() {
        let opts = FitOptions {
            bootstrap_samples: 64,
            seed: 3,
            ..FitOptions::default()
        };
        assert_eq!(run(&opts).errors, run(&opts).errors);
    }
}
