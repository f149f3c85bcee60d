//! Reporting utilities: per-point residuals and the worst-fitting points.

pub mod format;

pub use format::*;

use crate::domain::{DataSet, FitResult};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;

/// One data point against the fitted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResidual {
    /// 1-based row in the data set.
    pub row: usize,
    pub x: f64,
    pub y: f64,
    pub y_fit: f64,
    pub residual: f64,
    /// `residual / σy`, when `σy > 0`.
    pub normalized: Option<f64>,
}

impl PointResidual {
    /// Size used for ranking: normalized when available, raw otherwise.
    pub fn magnitude(&self) -> f64 {
        self.normalized.unwrap_or(self.residual).abs()
    }
}

/// Fitted values and residuals for each point.
pub fn compute_residuals(data: &DataSet, model: &CompiledModel, fit: &FitResult) -> Result<Vec<PointResidual>> {
    let y_fit = model.evaluate(&fit.parameter_values, data.x());
    let mut out = Vec::with_capacity(data.len());
    for (i, f) in y_fit.into_iter().enumerate() {
        if !f.is_finite() {
            return Err(LabFitError::Numerical(format!(
                "the fitted model is not finite at x = {}",
                data.x()[i]
            )));
        }
        let y = data.y()[i];
        let sy = data.sigma_y()[i];
        let residual = y - f;
        out.push(PointResidual {
            row: i + 1,
            x: data.x()[i],
            y,
            y_fit: f,
            residual,
            normalized: (sy > 0.0).then(|| residual / sy),
        });
    }
    Ok(out)
}

/// The `top_n` points farthest from the curve, largest first.
pub fn worst_points(residuals: &[PointResidual], top_n: usize) -> Vec<PointResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| {
        b.magnitude()
            .partial_cmp(&a.magnitude())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnFormat, FitDiagnostics, FitMethod, RawTable};
    use crate::expr::compile_equation;

    fn fit(values: Vec<f64>) -> FitResult {
        FitResult {
            method: FitMethod::LeastSquares,
            equation_text: "a*x".to_string(),
            parameters: vec!["a".to_string()],
            parameter_values: values,
            parameter_errors: vec![0.0],
            covariance: None,
            chi_squared: f64::NAN,
            reduced_chi_squared: None,
            r_squared: 1.0,
            n_points: 3,
            diagnostics: FitDiagnostics::default(),
        }
    }

    #[test]
    fn residuals_and_ranking() {
        let data = DataSet::new(
            vec![1.0, 2.0, 3.0],
            vec![0.0; 3],
            vec![2.0, 4.5, 5.0],
            vec![0.5, 0.0, 0.5],
            ColumnFormat::XYSigmaY,
            RawTable::default(),
        )
        .unwrap();
        let model = compile_equation("a*x").unwrap();
        let residuals = compute_residuals(&data, &model, &fit(vec![2.0])).unwrap();

        assert_eq!(residuals[0].residual, 0.0);
        assert_eq!(residuals[1].normalized, None);
        assert_eq!(residuals[2].normalized, Some(-2.0));

        let worst = worst_points(&residuals, 1);
        assert_eq!(worst[0].row, 3);
    }

    #[test]
    fn non_finite_prediction_is_an_error() {
        let data = DataSet::new(
            vec![0.0, 1.0],
            vec![0.0; 2],
            vec![1.0, 1.0],
            vec![0.0; 2],
            ColumnFormat::TwoColumns,
            RawTable::default(),
        )
        .unwrap();
        let model = compile_equation("a/x").unwrap();
        assert!(matches!(
            compute_residuals(&data, &model, &fit(vec![1.0])),
            Err(LabFitError::Numerical(_))
        ));
    }
}
