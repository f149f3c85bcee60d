//! Fit execution.
//!
//! Responsibilities:
//!
//! - validate inputs before any numerics run
//! - dispatch a `FitMethod` to its `Estimator` (one registration point)
//! - compute goodness-of-fit statistics on the final parameters
//! - report progress through `FitProgress`; optionally on a worker thread
//!
//! Which methods a data set allows is decided by the caller (`policy`).

pub mod bayesian;
pub mod bootstrap;
pub mod lm;
pub mod odr;
pub mod policy;
pub mod progress;
pub mod robust;
pub mod worker;

use nalgebra::DMatrix;

use crate::domain::{FitDiagnostics, FitMethod, FitOptions, FitResult};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;
use crate::math::{chi_squared, r_squared, reduced_chi_squared, to_rows};

pub use bayesian::BayesianEstimator;
pub use bootstrap::BootstrapEstimator;
pub use lm::LeastSquaresEstimator;
pub use odr::OdrEstimator;
pub use policy::{FitWarning, MethodPolicy};
pub use progress::{FitProgress, ProgressSnapshot};
pub use robust::RobustEstimator;
pub use worker::{FitHandle, FitRequest, spawn_fit};

/// Validated inputs shared by every estimator.
#[derive(Debug, Clone, Copy)]
pub struct FitProblem<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub sigma_x: &'a [f64],
    pub sigma_y: &'a [f64],
    pub model: &'a CompiledModel,
    pub initial: &'a [f64],
    pub max_iter: usize,
    pub opts: &'a FitOptions,
}

impl FitProblem<'_> {
    pub fn n(&self) -> usize {
        self.x.len()
    }

    pub fn p(&self) -> usize {
        self.initial.len()
    }
}

/// Parameter estimate produced by an estimator (statistics are added later).
#[derive(Debug, Clone)]
pub struct Estimate {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
    pub covariance: Option<DMatrix<f64>>,
    pub diagnostics: FitDiagnostics,
}

/// One fitting strategy.
///
/// Implementations hold no mutable state, so one instance serves every fit.
pub trait Estimator: Send + Sync {
    fn method(&self) -> FitMethod;

    fn fit(&self, problem: &FitProblem<'_>, progress: &FitProgress) -> Result<Estimate>;
}

static ODR: OdrEstimator = OdrEstimator;
static LEAST_SQUARES: LeastSquaresEstimator = LeastSquaresEstimator;
static ROBUST: RobustEstimator = RobustEstimator;
static BOOTSTRAP: BootstrapEstimator = BootstrapEstimator;
static BAYESIAN: BayesianEstimator = BayesianEstimator;

/// Dispatch table from method tag to implementation.
pub fn estimator_for(method: FitMethod) -> &'static dyn Estimator {
    match method {
        FitMethod::Odr => &ODR,
        FitMethod::LeastSquares => &LEAST_SQUARES,
        FitMethod::Robust => &ROBUST,
        FitMethod::Bootstrap => &BOOTSTRAP,
        FitMethod::Bayesian => &BAYESIAN,
    }
}

/// `1/σy²` when every σy is strictly positive, else unit weights.
pub fn base_weights(sigma_y: &[f64]) -> Vec<f64> {
    if !sigma_y.is_empty() && sigma_y.iter().all(|s| *s > 0.0) {
        sigma_y.iter().map(|s| 1.0 / (s * s)).collect()
    } else {
        vec![1.0; sigma_y.len()]
    }
}

fn validate(
    x: &[f64],
    y: &[f64],
    sigma_x: &[f64],
    sigma_y: &[f64],
    model: &CompiledModel,
    initial: &[f64],
    max_iter: usize,
) -> Result<()> {
    let n = x.len();
    if n == 0 {
        return Err(LabFitError::Validation("the data set is empty".to_string()));
    }
    if y.len() != n || sigma_x.len() != n || sigma_y.len() != n {
        return Err(LabFitError::Validation(format!(
            "array lengths differ: x={n}, y={}, sigma_x={}, sigma_y={}",
            y.len(),
            sigma_x.len(),
            sigma_y.len()
        )));
    }
    if max_iter == 0 {
        return Err(LabFitError::Validation(
            "the iteration limit must be positive".to_string(),
        ));
    }
    let p = model.n_params();
    if p == 0 {
        return Err(LabFitError::Validation(
            "the equation has no free parameters to fit".to_string(),
        ));
    }
    if initial.len() != p {
        return Err(LabFitError::Validation(format!(
            "{} initial values given for {p} parameters ({})",
            initial.len(),
            model.parameters().join(", ")
        )));
    }
    for (name, values) in [("x", x), ("y", y), ("sigma_x", sigma_x), ("sigma_y", sigma_y), ("initial", initial)] {
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(LabFitError::Validation(format!(
                "non-finite value in '{name}' at position {}",
                pos + 1
            )));
        }
    }
    if sigma_x.iter().chain(sigma_y).any(|s| *s < 0.0) {
        return Err(LabFitError::Validation("uncertainties must not be negative".to_string()));
    }
    if n < p {
        return Err(LabFitError::Validation(format!(
            "{n} points cannot determine {p} parameters"
        )));
    }
    Ok(())
}

/// Fit `model` to the data with `method`.
///
/// `progress` is reset at the start and marked done when the call returns,
/// whether it succeeds or fails.
#[allow(clippy::too_many_arguments)]
pub fn run_fit(
    method: FitMethod,
    x: &[f64],
    y: &[f64],
    sigma_x: &[f64],
    sigma_y: &[f64],
    model: Option<&CompiledModel>,
    initial: &[f64],
    max_iter: usize,
    opts: &FitOptions,
    progress: &FitProgress,
) -> Result<FitResult> {
    let result = run_fit_inner(method, x, y, sigma_x, sigma_y, model, initial, max_iter, opts, progress);
    progress.finish();
    result
}

#[allow(clippy::too_many_arguments)]
fn run_fit_inner(
    method: FitMethod,
    x: &[f64],
    y: &[f64],
    sigma_x: &[f64],
    sigma_y: &[f64],
    model: Option<&CompiledModel>,
    initial: &[f64],
    max_iter: usize,
    opts: &FitOptions,
    progress: &FitProgress,
) -> Result<FitResult> {
    let model = model.ok_or(LabFitError::MissingModel)?;
    validate(x, y, sigma_x, sigma_y, model, initial, max_iter)?;

    let problem = FitProblem {
        x,
        y,
        sigma_x,
        sigma_y,
        model,
        initial,
        max_iter,
        opts,
    };

    log::info!(
        "fitting '{}' with {} ({} points, {} parameters)",
        model.equation_text().trim(),
        method.display_name(),
        problem.n(),
        problem.p()
    );

    let estimate = estimator_for(method).fit(&problem, progress)?;
    if estimate.values.iter().any(|v| !v.is_finite()) {
        return Err(LabFitError::Numerical(
            "the fit produced non-finite parameter values".to_string(),
        ));
    }

    let n = problem.n();
    let p = problem.p();
    let y_fit = model.evaluate(&estimate.values, x);
    let chi2 = chi_squared(y, &y_fit, sigma_y);

    let result = FitResult {
        method,
        equation_text: model.equation_text().to_string(),
        parameters: model.parameters().to_vec(),
        parameter_values: estimate.values,
        parameter_errors: estimate.errors,
        covariance: estimate.covariance.as_ref().map(to_rows),
        chi_squared: chi2,
        reduced_chi_squared: reduced_chi_squared(chi2, n, p),
        r_squared: r_squared(y, &y_fit),
        n_points: n,
        diagnostics: estimate.diagnostics,
    };

    log::debug!(
        "{} fit done: values={:?} r2={:.6} iterations={}",
        method.display_name(),
        result.parameter_values,
        result.r_squared,
        result.diagnostics.iterations
    );
    Ok(result)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::expr::{CompiledModel, compile_equation};

    /// Linear data `y = 2x + 1` with a deterministic ±0.05 wiggle.
    pub fn noisy_line(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| 2.0 * xi + 1.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        (x, y)
    }

    pub fn line_model() -> CompiledModel {
        compile_equation("a*x + b").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compile_equation;
    use approx::assert_relative_eq;

    fn fit(method: FitMethod, x: &[f64], y: &[f64], sx: &[f64], sy: &[f64], text: &str, init: &[f64]) -> Result<FitResult> {
        let model = compile_equation(text).unwrap();
        run_fit(
            method,
            x,
            y,
            sx,
            sy,
            Some(&model),
            init,
            100,
            &FitOptions::default(),
            &FitProgress::new(),
        )
    }

    #[test]
    fn missing_model_is_rejected_first() {
        let progress = FitProgress::new();
        let err = run_fit(
            FitMethod::LeastSquares,
            &[],
            &[],
            &[],
            &[],
            None,
            &[],
            10,
            &FitOptions::default(),
            &progress,
        )
        .unwrap_err();
        assert!(matches!(err, LabFitError::MissingModel));
        assert!(progress.is_done());
    }

    #[test]
    fn validation_errors() {
        let x = [1.0, 2.0, 3.0];
        let z = [0.0; 3];
        let bad = [
            fit(FitMethod::LeastSquares, &[], &[], &[], &[], "a*x", &[1.0]),
            fit(FitMethod::LeastSquares, &x, &[1.0, 2.0], &z, &z, "a*x", &[1.0]),
            fit(FitMethod::LeastSquares, &x, &x, &z, &z, "a*x", &[1.0, 2.0]),
            fit(FitMethod::LeastSquares, &x, &[1.0, f64::NAN, 3.0], &z, &z, "a*x", &[1.0]),
            fit(FitMethod::LeastSquares, &x, &x, &z, &z, "2*x", &[]),
            fit(FitMethod::LeastSquares, &x[..1], &x[..1], &z[..1], &z[..1], "a*x + b", &[1.0, 0.0]),
        ];
        for result in bad {
            assert!(matches!(result, Err(LabFitError::Validation(_))), "{result:?}");
        }
        let model = compile_equation("a*x").unwrap();
        let err = run_fit(
            FitMethod::Odr,
            &x,
            &x,
            &z,
            &z,
            Some(&model),
            &[1.0],
            0,
            &FitOptions::default(),
            &FitProgress::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LabFitError::Validation(_)));
    }

    #[test]
    fn least_squares_recovers_slope_with_statistics() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let sy = [0.1; 5];
        let r = fit(FitMethod::LeastSquares, &x, &y, &[0.0; 5], &sy, "a*x", &[1.0]).unwrap();
        assert_relative_eq!(r.parameter_values[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(r.r_squared, 1.0, epsilon = 1e-12);
        assert!(r.chi_squared < 1e-12);
        assert!(r.reduced_chi_squared.is_some());
        assert_eq!(r.parameters, vec!["a"]);
        assert_eq!(r.n_points, 5);
    }

    #[test]
    fn chi_squared_is_nan_without_sigma_y() {
        let (x, y) = test_support::noisy_line(6);
        let model = test_support::line_model();
        let r = run_fit(
            FitMethod::LeastSquares,
            &x,
            &y,
            &[0.0; 6],
            &[0.0; 6],
            Some(&model),
            &[1.0, 0.0],
            100,
            &FitOptions::default(),
            &FitProgress::new(),
        )
        .unwrap();
        assert!(r.chi_squared.is_nan());
        assert!(r.reduced_chi_squared.is_none());
        assert!(r.parameter_errors.iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn constant_data_with_exact_model_has_unit_r_squared() {
        let x = [1.0, 2.0, 3.0];
        let y = [4.0, 4.0, 4.0];
        let r = fit(FitMethod::LeastSquares, &x, &y, &[0.0; 3], &[0.0; 3], "c + 0*x", &[1.0]).unwrap();
        assert_relative_eq!(r.parameter_values[0], 4.0, epsilon = 1e-10);
        assert_eq!(r.r_squared, 1.0);
    }

    #[test]
    fn constant_inexact_data_keeps_degenerate_r_squared() {
        let x = [1.0, 2.0, 3.0];
        let y = [0.1, 0.1, 0.1];
        let sloped = fit(FitMethod::LeastSquares, &x, &y, &[0.0; 3], &[0.0; 3], "a*x", &[1.0]).unwrap();
        assert!(sloped.r_squared.is_nan());
        let flat = fit(FitMethod::LeastSquares, &x, &y, &[0.0; 3], &[0.0; 3], "c", &[1.0]).unwrap();
        assert_eq!(flat.r_squared, 1.0);
    }

    #[test]
    fn exactly_determined_fit_has_no_covariance() {
        let r = fit(
            FitMethod::LeastSquares,
            &[1.0, 2.0],
            &[3.0, 5.0],
            &[0.0; 2],
            &[0.0; 2],
            "a*x + b",
            &[0.0, 0.0],
        )
        .unwrap();
        assert!(r.covariance.is_none());
        assert!(r.parameter_errors.iter().all(|e| e.is_nan()));
        assert!(r.reduced_chi_squared.is_none());
    }

    #[test]
    fn every_method_has_a_registered_estimator() {
        for method in FitMethod::ALL {
            assert_eq!(estimator_for(method).method(), method);
        }
    }
}
