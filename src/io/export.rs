//! Export fit results.
//!
//! - fit JSON: the `FitResult` plus run metadata, for downstream scripts
//! - residual CSV: one row per point with the fitted value and residuals

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::{DataSet, FitResult};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;

/// Portable representation of one fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitExport {
    pub tool: String,
    pub generated_at: DateTime<Local>,
    pub data_format: String,
    pub result: FitResult,
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, result: &FitResult, dataset: &DataSet) -> Result<()> {
    let file = File::create(path).map_err(|e| LabFitError::io(path, e))?;

    let export = FitExport {
        tool: "labfit".to_string(),
        generated_at: Local::now(),
        data_format: dataset.column_format().label(),
        result: result.clone(),
    };

    serde_json::to_writer_pretty(BufWriter::new(file), &export)
        .map_err(|e| LabFitError::Internal(format!("failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Write per-point residuals to a CSV file.
///
/// `normalized_residual` is `residual / σy` and left empty where `σy` is zero.
pub fn write_residuals_csv(path: &Path, dataset: &DataSet, model: &CompiledModel, result: &FitResult) -> Result<()> {
    let file = File::create(path).map_err(|e| LabFitError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let y_fit = model.evaluate(&result.parameter_values, dataset.x());

    writeln!(out, "x,sigma_x,y,sigma_y,y_fit,residual,normalized_residual").map_err(|e| LabFitError::io(path, e))?;

    for (i, fit) in y_fit.iter().enumerate() {
        let y = dataset.y()[i];
        let sy = dataset.sigma_y()[i];
        let residual = y - fit;
        let normalized = if sy > 0.0 {
            format!("{:.10}", residual / sy)
        } else {
            String::new()
        };
        writeln!(
            out,
            "{},{},{},{},{:.10},{:.10},{}",
            dataset.x()[i],
            dataset.sigma_x()[i],
            y,
            sy,
            fit,
            residual,
            normalized
        )
        .map_err(|e| LabFitError::io(path, e))?;
    }
    out.flush().map_err(|e| LabFitError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnFormat, FitDiagnostics, FitMethod, RawTable};
    use crate::expr::compile_equation;

    fn sample() -> (DataSet, CompiledModel, FitResult) {
        let ds = DataSet::new(
            vec![1.0, 2.0],
            vec![0.0, 0.0],
            vec![2.5, 3.5],
            vec![0.5, 0.0],
            ColumnFormat::XYSigmaY,
            RawTable {
                headers: None,
                columns: vec![],
            },
        )
        .unwrap();
        let model = compile_equation("a*x").unwrap();
        let result = FitResult {
            method: FitMethod::LeastSquares,
            equation_text: "a*x".into(),
            parameters: vec!["a".into()],
            parameter_values: vec![2.0],
            parameter_errors: vec![0.1],
            covariance: Some(vec![vec![0.01]]),
            chi_squared: f64::NAN,
            reduced_chi_squared: None,
            r_squared: 0.9,
            n_points: 2,
            diagnostics: FitDiagnostics::default(),
        };
        (ds, model, result)
    }

    #[test]
    fn residual_csv_has_one_row_per_point() {
        let (ds, model, result) = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("res.csv");
        write_residuals_csv(&path, &ds, &model, &result).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,0,2.5,0.5,2.0000000000,0.5000000000,1.0000000000"));
        assert!(lines[2].ends_with(','));
    }

    #[test]
    fn fit_json_carries_metadata() {
        let (ds, _, result) = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.json");
        write_fit_json(&path, &result, &ds).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["tool"], "labfit");
        assert_eq!(value["result"]["method"], "least-squares");
        assert_eq!(value["result"]["parameters"][0], "a");
    }
}
