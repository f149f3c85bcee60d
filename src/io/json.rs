//! Keyed JSON measurement files: `{"x": [...], "sigma_x": [...], "y": [...], "sigma_y": [...]}`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::domain::RawTable;
use crate::error::{LabFitError, Result};

#[derive(Debug, Deserialize)]
struct JsonTable {
    x: Vec<f64>,
    sigma_x: Vec<f64>,
    y: Vec<f64>,
    sigma_y: Vec<f64>,
}

pub fn read_json_table(path: &Path) -> Result<RawTable> {
    let file = File::open(path).map_err(|e| LabFitError::io(path, e))?;
    let table: JsonTable =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| LabFitError::Json(e.to_string()))?;
    table_to_raw(table)
}

fn table_to_raw(table: JsonTable) -> Result<RawTable> {
    let n = table.x.len();
    if table.sigma_x.len() != n || table.y.len() != n || table.sigma_y.len() != n {
        return Err(LabFitError::Json(format!(
            "arrays must have equal length (x={}, sigma_x={}, y={}, sigma_y={})",
            n,
            table.sigma_x.len(),
            table.y.len(),
            table.sigma_y.len()
        )));
    }
    if n == 0 {
        return Err(LabFitError::EmptyFile);
    }
    // Keep the canonical x, σx, y, σy order so the table re-reads as "standard".
    Ok(RawTable {
        headers: Some(
            ["x", "sigma_x", "y", "sigma_y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        columns: vec![table.x, table.sigma_x, table.y, table.sigma_y],
    })
}
