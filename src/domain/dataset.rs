//! The loaded measurement set.
//!
//! A `DataSet` is an immutable value: loading a file or re-assigning column roles
//! produces a new one, and the session swaps an `Arc` to it. A fit in flight keeps
//! its own reference to the arrays it started with.

use serde::{Deserialize, Serialize};

use crate::domain::{ColumnFormat, UncertaintyProfile};
use crate::error::{LabFitError, Result};

/// The untyped numeric matrix read from the source file (column-major).
///
/// Kept so the user can re-interpret column roles without reading the file again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Option<Vec<String>>,
    pub columns: Vec<Vec<f64>>,
}

impl RawTable {
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Header text for column `idx`, or an empty string when the file had none.
    pub fn header(&self, idx: usize) -> &str {
        self.headers
            .as_ref()
            .and_then(|h| h.get(idx))
            .map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    x: Vec<f64>,
    sigma_x: Vec<f64>,
    y: Vec<f64>,
    sigma_y: Vec<f64>,
    column_format: ColumnFormat,
    raw: RawTable,
}

impl DataSet {
    /// Build a data set, enforcing equal lengths and finite values.
    pub fn new(
        x: Vec<f64>,
        sigma_x: Vec<f64>,
        y: Vec<f64>,
        sigma_y: Vec<f64>,
        column_format: ColumnFormat,
        raw: RawTable,
    ) -> Result<Self> {
        let n = x.len();
        if sigma_x.len() != n || y.len() != n || sigma_y.len() != n {
            return Err(LabFitError::Validation(format!(
                "column lengths differ: x={}, sigma_x={}, y={}, sigma_y={}",
                n,
                sigma_x.len(),
                y.len(),
                sigma_y.len()
            )));
        }
        for (name, values) in [("x", &x), ("sigma_x", &sigma_x), ("y", &y), ("sigma_y", &sigma_y)] {
            if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                return Err(LabFitError::Validation(format!(
                    "non-finite value in '{name}' at row {}",
                    pos + 1
                )));
            }
        }
        Ok(Self {
            x,
            sigma_x,
            y,
            sigma_y,
            column_format,
            raw,
        })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn sigma_x(&self) -> &[f64] {
        &self.sigma_x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn sigma_y(&self) -> &[f64] {
        &self.sigma_y
    }

    pub fn column_format(&self) -> &ColumnFormat {
        &self.column_format
    }

    pub fn raw(&self) -> &RawTable {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Which uncertainty axes are populated, treating `|σ| <= eps` as zero.
    pub fn uncertainty_profile(&self, eps: f64) -> UncertaintyProfile {
        let has_x = !is_effectively_zero(&self.sigma_x, eps);
        let has_y = !is_effectively_zero(&self.sigma_y, eps);
        match (has_x, has_y) {
            (false, false) => UncertaintyProfile::None,
            (false, true) => UncertaintyProfile::YOnly,
            (true, false) => UncertaintyProfile::XOnly,
            (true, true) => UncertaintyProfile::Both,
        }
    }
}

/// True when every entry satisfies `|v| <= eps`.
pub fn is_effectively_zero(values: &[f64], eps: f64) -> bool {
    values.iter().all(|v| v.abs() <= eps)
}
