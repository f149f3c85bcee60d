//! Command-line parsing for the `labfit` curve fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. `app` turns parsed arguments into library calls.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{
    DEFAULT_MAX_ITER, DEFAULT_SEED, DEFAULT_SIGMA_ZERO_EPS, FitMethod, Locale, RobustStrategy,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "labfit", version, about = "Curve fitting for physics-lab measurements")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one or more equations to a data file and print the results.
    Fit(FitArgs),
    /// Load a data file and show how its columns were interpreted.
    Inspect(InspectArgs),
    /// Compile an equation and print its parameters and derivatives.
    Equation(EquationArgs),
}

/// Options shared by every command that reads data.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Measurement file (.csv, .txt, .dat, .json, .xlsx, .xls, .ods, ...).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    /// Override detected column roles, e.g. `x,sig_x,y,ignore`.
    #[arg(long, value_name = "ROLES")]
    pub roles: Option<String>,

    /// Uncertainties with |σ| at or below this value count as absent.
    #[arg(long = "sigma-eps", default_value_t = DEFAULT_SIGMA_ZERO_EPS)]
    pub sigma_eps: f64,

    /// Language for error titles.
    #[arg(long, value_enum, default_value_t = Locale::En)]
    pub locale: Locale,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Equation to fit, e.g. `y = a*exp(-k*x)`. Repeat to fit several in turn.
    #[arg(short = 'e', long = "equation", required = true)]
    pub equations: Vec<String>,

    /// Declare the parameter names instead of extracting them (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub params: Option<Vec<String>>,

    /// Initial values in lexical parameter order (default: 1 for each).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub initial: Option<Vec<f64>>,

    /// Fit method (default depends on the uncertainty columns present).
    #[arg(short = 'm', long, value_enum)]
    pub method: Option<FitMethod>,

    /// Strategy for `--method robust`.
    #[arg(long, value_enum, default_value_t = RobustStrategy::Huber)]
    pub robust_strategy: RobustStrategy,

    /// Iteration cap for the iterative solvers.
    #[arg(long, default_value_t = DEFAULT_MAX_ITER)]
    pub max_iter: usize,

    /// Resamples (bootstrap) or retained posterior samples (bayesian).
    #[arg(long)]
    pub samples: Option<usize>,

    /// Seed for bootstrap, RANSAC and Metropolis.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Show the N points farthest from each fitted curve.
    #[arg(long, default_value_t = 5)]
    pub worst: usize,

    /// Export the last fit as JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export per-point residuals of the last fit as CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

#[derive(Debug, Args, Clone)]
pub struct EquationArgs {
    /// Equation text, e.g. `f(x) = A*sin(w*x + phi)`.
    pub equation: String,

    /// Declared parameter names (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub params: Option<Vec<String>>,
}
