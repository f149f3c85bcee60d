//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between the reader, the compiler and the fit executor
//! - exported to JSON
//! - parsed straight from CLI flags (`ValueEnum`)

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::LabFitError;

/// Language of user-facing error titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

/// Role of one column when the user re-interprets a loaded table by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    X,
    Y,
    SigX,
    SigY,
    Ignore,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::X => "x",
            ColumnRole::Y => "y",
            ColumnRole::SigX => "sig_x",
            ColumnRole::SigY => "sig_y",
            ColumnRole::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

impl FromStr for ColumnRole {
    type Err = LabFitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(ColumnRole::X),
            "y" => Ok(ColumnRole::Y),
            "sig_x" | "sigma_x" => Ok(ColumnRole::SigX),
            "sig_y" | "sigma_y" => Ok(ColumnRole::SigY),
            "ignore" | "-" => Ok(ColumnRole::Ignore),
            other => Err(LabFitError::RoleAssignment(format!(
                "unknown role '{other}' (expected x, y, sig_x, sig_y or ignore)"
            ))),
        }
    }
}

/// How the columns of the source file were interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFormat {
    /// `x, y`
    TwoColumns,
    /// `x, y, σy`
    XYSigmaY,
    /// `x, σx, y`
    XSigmaXY,
    /// `x, σx, y, σy`
    Standard,
    /// `x, y, σx, σy`
    Alternate,
    /// Keyed JSON object.
    Json,
    /// Explicit per-column roles chosen by the user.
    Manual(Vec<ColumnRole>),
}

impl ColumnFormat {
    pub fn label(&self) -> String {
        match self {
            ColumnFormat::TwoColumns => "2 columns: x,y".to_string(),
            ColumnFormat::XYSigmaY => "3 columns: x,y,σy".to_string(),
            ColumnFormat::XSigmaXY => "3 columns: x,σx,y".to_string(),
            ColumnFormat::Standard => "x,σx,y,σy standard".to_string(),
            ColumnFormat::Alternate => "x,y,σx,σy alternate".to_string(),
            ColumnFormat::Json => "json: x,sigma_x,y,sigma_y".to_string(),
            ColumnFormat::Manual(roles) => {
                let roles: Vec<String> = roles.iter().map(ToString::to_string).collect();
                format!("manual: {}", roles.join(","))
            }
        }
    }
}

impl fmt::Display for ColumnFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Which uncertainty axes of a data set carry information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyProfile {
    None,
    YOnly,
    XOnly,
    Both,
}

impl UncertaintyProfile {
    pub fn has_sigma_x(self) -> bool {
        matches!(self, UncertaintyProfile::XOnly | UncertaintyProfile::Both)
    }

    pub fn has_sigma_y(self) -> bool {
        matches!(self, UncertaintyProfile::YOnly | UncertaintyProfile::Both)
    }
}

/// Estimator used for a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitMethod {
    /// Orthogonal distance regression (uses σx and σy).
    Odr,
    /// Levenberg–Marquardt least squares (uses σy only).
    LeastSquares,
    /// Outlier-resistant fit (Huber IRLS or RANSAC).
    Robust,
    /// Least squares repeated over resampled data sets.
    Bootstrap,
    /// Metropolis sampling of the parameter posterior.
    Bayesian,
}

impl FitMethod {
    pub const ALL: [FitMethod; 5] = [
        FitMethod::Odr,
        FitMethod::LeastSquares,
        FitMethod::Robust,
        FitMethod::Bootstrap,
        FitMethod::Bayesian,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::Odr => "ODR",
            FitMethod::LeastSquares => "Least squares",
            FitMethod::Robust => "Robust",
            FitMethod::Bootstrap => "Bootstrap",
            FitMethod::Bayesian => "Bayesian",
        }
    }

    /// Whether the estimator takes σx into account.
    pub fn uses_sigma_x(self) -> bool {
        matches!(self, FitMethod::Odr)
    }
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Outlier-resistant strategy for `FitMethod::Robust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RobustStrategy {
    /// Huber M-estimator via iteratively reweighted least squares.
    #[default]
    Huber,
    /// Random sample consensus over minimal subsets.
    Ransac,
}

/// Method-specific knobs. Fields a method does not use are ignored.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub robust_strategy: RobustStrategy,
    /// Huber tuning constant (in units of the robust residual scale).
    pub huber_k: f64,
    /// Number of IRLS reweight iterations.
    pub robust_iters: usize,
    /// Number of random minimal subsets tried by RANSAC.
    pub ransac_trials: usize,
    /// Inlier threshold on standardized residuals; `None` derives it from the MAD.
    pub ransac_threshold: Option<f64>,
    /// Number of bootstrap resamples.
    pub bootstrap_samples: usize,
    /// Number of retained posterior samples.
    pub bayesian_samples: usize,
    /// Burn-in steps before samples are retained; `None` means half of `bayesian_samples`.
    pub bayesian_burn_in: Option<usize>,
    /// Seed for every random stream (resampling, RANSAC, Metropolis).
    pub seed: u64,
    /// An uncertainty is treated as absent when `|σ| <= sigma_zero_eps`.
    pub sigma_zero_eps: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            robust_strategy: RobustStrategy::Huber,
            huber_k: 1.345,
            robust_iters: 10,
            ransac_trials: 200,
            ransac_threshold: None,
            bootstrap_samples: 1000,
            bayesian_samples: 1000,
            bayesian_burn_in: None,
            seed: DEFAULT_SEED,
            sigma_zero_eps: DEFAULT_SIGMA_ZERO_EPS,
        }
    }
}

/// Absolute tolerance below which an uncertainty counts as zero.
pub const DEFAULT_SIGMA_ZERO_EPS: f64 = 1e-8;

/// Seed shared by every random stream unless overridden.
pub const DEFAULT_SEED: u64 = 42;

/// Default iteration cap for the iterative solvers.
pub const DEFAULT_MAX_ITER: usize = 1000;

/// Solver/sampler diagnostics attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub iterations: usize,
    pub converged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resamples_used: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inliers: Option<usize>,
}

/// Output of one fit execution.
///
/// The equation text and parameter names are captured at fit time so a history
/// entry can be displayed without the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub method: FitMethod,
    pub equation_text: String,
    pub parameters: Vec<String>,
    pub parameter_values: Vec<f64>,
    pub parameter_errors: Vec<f64>,
    pub covariance: Option<Vec<Vec<f64>>>,
    /// NaN unless every σy is strictly positive.
    pub chi_squared: f64,
    /// Present when `n > p` and `chi_squared` is finite.
    pub reduced_chi_squared: Option<f64>,
    /// NaN for a constant `y` that the model does not reproduce.
    pub r_squared: f64,
    pub n_points: usize,
    pub diagnostics: FitDiagnostics,
}

impl FitResult {
    pub fn value_of(&self, parameter: &str) -> Option<f64> {
        let idx = self.parameters.iter().position(|p| p == parameter)?;
        self.parameter_values.get(idx).copied()
    }

    pub fn error_of(&self, parameter: &str) -> Option<f64> {
        let idx = self.parameters.iter().position(|p| p == parameter)?;
        self.parameter_errors.get(idx).copied()
    }
}

/// Session-wide settings (derived from CLI flags plus defaults).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub locale: Locale,
    pub sigma_zero_eps: f64,
    pub max_iter: usize,
    pub seed: u64,
}

impl SessionConfig {
    /// Fit options seeded from the session-wide settings.
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            seed: self.seed,
            sigma_zero_eps: self.sigma_zero_eps,
            ..FitOptions::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            sigma_zero_eps: DEFAULT_SIGMA_ZERO_EPS,
            max_iter: DEFAULT_MAX_ITER,
            seed: DEFAULT_SEED,
        }
    }
}
