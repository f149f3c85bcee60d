//! Shared "fit pipeline" logic behind the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load data -> (optional) re-assign roles -> compile -> fit -> residuals
//!
//! The CLI can then focus on presentation.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{ColumnRole, FitMethod, FitOptions, FitResult, SessionConfig};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;
use crate::fit::{FitWarning, ProgressSnapshot};
use crate::report::{PointResidual, compute_residuals};
use crate::session::Session;

/// Everything a `labfit fit` run needs, resolved from CLI arguments.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub data: PathBuf,
    pub roles: Option<Vec<ColumnRole>>,
    pub equations: Vec<String>,
    pub params: Option<Vec<String>>,
    pub initial: Option<Vec<f64>>,
    /// `None` picks the default for the data's uncertainty columns.
    pub method: Option<FitMethod>,
    pub opts: FitOptions,
    pub session: SessionConfig,
    pub worst: usize,
    pub export: Option<PathBuf>,
    pub export_residuals: Option<PathBuf>,
}

/// One fitted equation.
#[derive(Debug, Clone)]
pub struct EquationRun {
    pub model: Arc<CompiledModel>,
    pub result: FitResult,
    pub warning: Option<FitWarning>,
    pub residuals: Vec<PointResidual>,
}

/// All computed outputs of a single `labfit fit` run.
#[derive(Debug)]
pub struct RunOutput {
    pub session: Session,
    pub runs: Vec<EquationRun>,
}

/// Load the data file and apply a manual role override if one was given.
pub fn prepare_session(config: SessionConfig, data: &std::path::Path, roles: Option<&[ColumnRole]>) -> Result<Session> {
    let mut session = Session::new(config);
    session.load_data(data)?;
    if let Some(roles) = roles {
        session.reassign(roles)?;
    }
    Ok(session)
}

/// Execute the full pipeline for every equation in `config`.
///
/// `on_progress` is called periodically while each fit runs.
pub fn run_fit<F>(config: &FitConfig, mut on_progress: F) -> Result<RunOutput>
where
    F: FnMut(&str, ProgressSnapshot),
{
    let mut session = prepare_session(config.session.clone(), &config.data, config.roles.as_deref())?;
    let data = session
        .data()
        .ok_or_else(|| LabFitError::Internal("data missing after load".to_string()))?;
    let policy = session
        .policy()
        .ok_or_else(|| LabFitError::Internal("data missing after load".to_string()))?;
    let method = config.method.unwrap_or_else(|| policy.default_method());

    let mut runs = Vec::with_capacity(config.equations.len());
    for text in &config.equations {
        let model = session.compile(text, config.params.as_deref())?;
        let initial = match &config.initial {
            Some(values) => values.clone(),
            None => vec![1.0; model.n_params()],
        };

        let started = session.start_fit(method, initial, config.opts.clone())?;
        let result = started
            .handle
            .wait_with_progress(std::time::Duration::from_millis(100), |snap| on_progress(text, snap))?;
        let residuals = compute_residuals(&data, &model, &result)?;
        session.record(result.clone());

        runs.push(EquationRun {
            model,
            result,
            warning: started.warning,
            residuals,
        });
    }

    if let Some(last) = runs.last() {
        if let Some(path) = &config.export {
            crate::io::write_fit_json(path, &last.result, &data)?;
        }
        if let Some(path) = &config.export_residuals {
            crate::io::write_residuals_csv(path, &data, &last.model, &last.result)?;
        }
    }

    Ok(RunOutput { session, runs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(data: PathBuf, equations: &[&str]) -> FitConfig {
        FitConfig {
            data,
            roles: None,
            equations: equations.iter().map(|s| s.to_string()).collect(),
            params: None,
            initial: None,
            method: None,
            opts: FitOptions::default(),
            session: SessionConfig::default(),
            worst: 3,
            export: None,
            export_residuals: None,
        }
    }

    #[test]
    fn fits_each_equation_and_records_history() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "# x sx y sy").unwrap();
        for i in 1..=8 {
            let x = f64::from(i);
            writeln!(file, "{x} 0.05 {} 0.1", 2.0 * x + 1.0).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(file.path().to_path_buf(), &["a*x + b", "a*x"]);
        cfg.export = Some(dir.path().join("fit.json"));

        let mut calls = 0;
        let out = run_fit(&cfg, |_, _| calls += 1).unwrap();

        assert_eq!(out.runs.len(), 2);
        assert_eq!(out.runs[0].result.method, FitMethod::Odr);
        assert!((out.runs[0].result.parameter_values[0] - 2.0).abs() < 1e-6);
        assert_eq!(out.session.history().len(), 2);
        assert!(calls >= 2);
        assert!(dir.path().join("fit.json").exists());
    }

    #[test]
    fn role_override_is_applied() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "t;v;junk").unwrap();
        writeln!(file, "1;3;9").unwrap();
        writeln!(file, "2;6;9").unwrap();
        writeln!(file, "3;9;9").unwrap();
        let roles = [ColumnRole::X, ColumnRole::Y, ColumnRole::Ignore];
        let session = prepare_session(SessionConfig::default(), file.path(), Some(&roles)).unwrap();
        let data = session.data().unwrap();
        assert_eq!(data.y(), &[3.0, 6.0, 9.0]);
        assert!(data.sigma_y().iter().all(|s| *s == 0.0));
    }
}
