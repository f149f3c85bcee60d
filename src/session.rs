//! Long-lived state behind one user session.
//!
//! The session owns the model cache, the current data set (behind an `Arc`
//! that is swapped, never mutated), the current model and the fit history.
//! Loading new data or re-assigning columns starts a fresh history, since the
//! history belongs to one data set.

use std::path::Path;
use std::sync::Arc;

use crate::domain::{ColumnRole, DataSet, FitMethod, FitOptions, FitResult, SessionConfig};
use crate::error::{ErrorReporter, LabFitError, LogReporter, Result};
use crate::expr::{CompiledModel, Compiler, ModelCache};
use crate::fit::{FitHandle, FitRequest, FitWarning, MethodPolicy, spawn_fit};
use crate::history::FitHistory;
use crate::io::{Preview, read_tabular_with, reassign_columns};

#[derive(Debug, Default)]
pub struct Session {
    config: SessionConfig,
    compiler: Compiler,
    cache: ModelCache,
    data: Option<Arc<DataSet>>,
    preview: Option<Preview>,
    model: Option<Arc<CompiledModel>>,
    history: FitHistory,
}

/// A fit started by the session, plus the policy warning it raised (if any).
pub struct StartedFit {
    pub handle: FitHandle,
    pub warning: Option<FitWarning>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn data(&self) -> Option<Arc<DataSet>> {
        self.data.clone()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn model(&self) -> Option<Arc<CompiledModel>> {
        self.model.clone()
    }

    pub fn history(&self) -> &FitHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut FitHistory {
        &mut self.history
    }

    pub fn load_data(&mut self, path: &Path) -> Result<Arc<DataSet>> {
        self.load_data_with(path, &LogReporter)
    }

    /// Read `path` and make it the current data set.
    pub fn load_data_with(&mut self, path: &Path, reporter: &dyn ErrorReporter) -> Result<Arc<DataSet>> {
        let loaded = read_tabular_with(path, self.config.locale, reporter)?;
        self.preview = Some(loaded.preview);
        Ok(self.replace_data(loaded.dataset))
    }

    /// Re-interpret the current raw table with explicit column roles.
    pub fn reassign(&mut self, roles: &[ColumnRole]) -> Result<Arc<DataSet>> {
        let current = self.require_data()?;
        let dataset = reassign_columns(current.raw(), roles)?;
        log::info!("column roles re-assigned: {}", dataset.column_format());
        Ok(self.replace_data(dataset))
    }

    fn replace_data(&mut self, dataset: DataSet) -> Arc<DataSet> {
        let data = Arc::new(dataset);
        self.data = Some(Arc::clone(&data));
        self.history.clear();
        data
    }

    fn require_data(&self) -> Result<Arc<DataSet>> {
        self.data
            .clone()
            .ok_or_else(|| LabFitError::Validation("no data has been loaded".to_string()))
    }

    /// Compile (or fetch from the cache) and make it the current model.
    pub fn compile(&mut self, text: &str, declared: Option<&[String]>) -> Result<Arc<CompiledModel>> {
        let model = self.cache.get_or_compile(&self.compiler, text, declared)?;
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn policy(&self) -> Option<MethodPolicy> {
        self.data
            .as_ref()
            .map(|d| MethodPolicy::for_dataset(d, self.config.sigma_zero_eps))
    }

    /// Fit options carrying the session seed and σ-zero tolerance.
    pub fn fit_options(&self) -> FitOptions {
        self.config.fit_options()
    }

    /// Check the method against the data and start it on a worker thread.
    pub fn start_fit(&self, method: FitMethod, initial: Vec<f64>, opts: FitOptions) -> Result<StartedFit> {
        let model = self.model.clone().ok_or(LabFitError::MissingModel)?;
        let data = self.require_data()?;
        let warning = MethodPolicy::for_dataset(&data, opts.sigma_zero_eps).check(method)?;
        if let Some(w) = &warning {
            log::warn!("{w}");
        }
        let handle = spawn_fit(FitRequest {
            method,
            data,
            model,
            initial,
            max_iter: self.config.max_iter,
            opts,
        })?;
        Ok(StartedFit { handle, warning })
    }

    /// Run a fit to completion and record it in the history.
    pub fn fit(&mut self, method: FitMethod, initial: Vec<f64>, opts: FitOptions) -> Result<&FitResult> {
        let started = self.start_fit(method, initial, opts)?;
        let result = started.handle.join()?;
        Ok(self.record(result))
    }

    pub fn record(&mut self, result: FitResult) -> &FitResult {
        self.history.record(result);
        // `record` always leaves the cursor on the new entry.
        &self.history.entries()[self.history.len() - 1].result
    }
}
