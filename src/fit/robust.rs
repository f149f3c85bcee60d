//! Outlier-resistant fitting.
//!
//! Two strategies share the `Robust` method tag:
//!
//! - **Huber**: iteratively reweighted least squares. Each pass fits with the
//!   current weights, then shrinks the weight of points whose standardized
//!   residual exceeds `k` robust scales (MAD). Deterministic.
//! - **RANSAC**: fit random minimal subsets (`p` points), count the points
//!   within a residual threshold, keep the largest consensus set and refit on
//!   it. Seeded, so reruns agree.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

use crate::domain::{FitMethod, RobustStrategy};
use crate::error::Result;
use crate::fit::lm::{fit_weighted, levenberg_marquardt};
use crate::fit::progress::FitProgress;
use crate::fit::{Estimate, Estimator, FitProblem, base_weights};
use crate::math::{huber_reweight, mad_scale};

/// Default RANSAC inlier threshold, in robust residual scales.
const RANSAC_SCALE_FACTOR: f64 = 2.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct RobustEstimator;

impl Estimator for RobustEstimator {
    fn method(&self) -> FitMethod {
        FitMethod::Robust
    }

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
        match problem.opts.robust_strategy {
            RobustStrategy::Huber => huber(problem, progress),
            RobustStrategy::Ransac => ransac(problem, progress),
        }
    }
}

/// `(y - f) · sqrt(w0)` at `params`.
fn standardized_residuals(problem: &FitProblem<'_>, params: &[f64], w0: &[f64]) -> Vec<f64> {
    problem
        .model
        .evaluate(params, problem.x)
        .iter()
        .zip(problem.y)
        .zip(w0)
        .map(|((f, y), w)| (y - f) * w.sqrt())
        .collect()
}

fn huber(problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
    let opts = problem.opts;
    let w_base = base_weights(problem.sigma_y);
    let n_refits = opts.robust_iters.saturating_add(1);
    progress.start(n_refits);

    // Fit, reweight, refit. The last pass's weights define the result.
    let mut weights = w_base.clone();
    let mut current = problem.initial.to_vec();
    let mut estimate = None;
    let mut total_iterations = 0;

    for pass in 0..n_refits {
        let step = FitProblem {
            initial: &current,
            ..*problem
        };
        let est = fit_weighted(&step, &weights, None)?;
        progress.advance();
        total_iterations += est.diagnostics.iterations;
        current = est.values.clone();
        estimate = Some(est);

        if pass + 1 == n_refits {
            break;
        }
        let residuals = standardized_residuals(problem, &current, &w_base);
        let next = huber_reweight(&w_base, &residuals, opts.huber_k);
        let settled = next
            .iter()
            .zip(&weights)
            .all(|(a, b)| (a - b).abs() <= 1e-12 * b.abs().max(1.0));
        weights = next;
        if settled {
            log::debug!("huber: weights settled after {} passes", pass + 1);
            break;
        }
    }

    let mut estimate = match estimate {
        Some(est) => est,
        None => fit_weighted(problem, &weights, None)?,
    };
    let inliers = weights.iter().zip(&w_base).filter(|(w, w0)| w >= w0).count();
    estimate.diagnostics.iterations = total_iterations;
    estimate.diagnostics.inliers = Some(inliers);
    Ok(estimate)
}

/// Arrays restricted to `indices`.
struct Subset {
    x: Vec<f64>,
    y: Vec<f64>,
    sigma_x: Vec<f64>,
    sigma_y: Vec<f64>,
}

impl Subset {
    fn pick(problem: &FitProblem<'_>, indices: &[usize]) -> Self {
        let take = |v: &[f64]| indices.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            x: take(problem.x),
            y: take(problem.y),
            sigma_x: take(problem.sigma_x),
            sigma_y: take(problem.sigma_y),
        }
    }
}

#[derive(Debug)]
struct Consensus {
    inliers: Vec<usize>,
    sse: f64,
}

impl Consensus {
    fn beats(&self, other: &Consensus) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len() && self.sse < other.sse)
    }
}

fn ransac(problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate> {
    let opts = problem.opts;
    let n = problem.n();
    let p = problem.p();
    let w0 = base_weights(problem.sigma_y);
    progress.start(opts.ransac_trials + 2);

    let full = fit_weighted(problem, &w0, None)?;
    progress.advance();
    let threshold = opts
        .ransac_threshold
        .unwrap_or_else(|| RANSAC_SCALE_FACTOR * mad_scale(&standardized_residuals(problem, &full.values, &w0)));
    log::debug!("ransac: {} trials, inlier threshold {threshold:.6e}", opts.ransac_trials);

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut best: Option<Consensus> = None;

    for _ in 0..opts.ransac_trials {
        progress.advance();
        let sample = index::sample(&mut rng, n, p).into_vec();
        let subset = Subset::pick(problem, &sample);
        let w_sub: Vec<f64> = sample.iter().map(|&i| w0[i]).collect();
        let Ok(fit) = levenberg_marquardt(
            problem.model,
            &subset.x,
            &subset.y,
            &w_sub,
            &full.values,
            problem.max_iter,
            None,
        ) else {
            continue;
        };

        let residuals = standardized_residuals(problem, &fit.params, &w0);
        let mut inliers = Vec::new();
        let mut sse = 0.0;
        for (i, r) in residuals.iter().enumerate() {
            if r.abs() <= threshold {
                inliers.push(i);
                sse += r * r;
            }
        }
        let candidate = Consensus { inliers, sse };
        if best.as_ref().is_none_or(|b| candidate.beats(b)) {
            best = Some(candidate);
        }
    }

    let consensus = best.filter(|c| c.inliers.len() >= p);
    let estimate = match consensus {
        Some(c) if c.inliers.len() < n => {
            let subset = Subset::pick(problem, &c.inliers);
            let w_sub: Vec<f64> = c.inliers.iter().map(|&i| w0[i]).collect();
            let sub_problem = FitProblem {
                x: &subset.x,
                y: &subset.y,
                sigma_x: &subset.sigma_x,
                sigma_y: &subset.sigma_y,
                initial: &full.values,
                ..*problem
            };
            let mut est = fit_weighted(&sub_problem, &w_sub, None)?;
            est.diagnostics.inliers = Some(c.inliers.len());
            est
        }
        Some(_) => {
            let mut est = full;
            est.diagnostics.inliers = Some(n);
            est
        }
        None => {
            log::warn!("RANSAC found no consensus set of at least {p} points; using the full-data fit");
            let mut est = full;
            est.diagnostics.inliers = Some(n);
            est
        }
    };
    progress.advance();
    Ok(estimate)
}
