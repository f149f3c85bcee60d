//! First-sheet reader for spreadsheet workbooks.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};

use crate::domain::RawTable;
use crate::error::{LabFitError, Result};

/// Read the first worksheet. The first row is always the header; at most the
/// first four columns are kept.
pub fn read_first_sheet(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LabFitError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LabFitError::Spreadsheet("the workbook has no sheets".to_string()))?
        .map_err(|e| LabFitError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or(LabFitError::EmptyFile)?;
    let width = header_row.len();
    if width < 2 {
        return Err(LabFitError::InsufficientColumns { found: width });
    }
    let kept = width.min(4);
    let headers: Vec<String> = header_row.iter().take(kept).map(cell_text).collect();

    let mut columns = vec![Vec::new(); kept];
    // Row 1 is the header, so data starts on sheet row 2.
    for (idx, row) in rows.enumerate() {
        let line = idx + 2;
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        for (j, column) in columns.iter_mut().enumerate() {
            let cell = row.get(j).unwrap_or(&Data::Empty);
            let value = cell_value(cell).ok_or_else(|| LabFitError::NonNumeric {
                line,
                column: j + 1,
                value: cell_text(cell),
            })?;
            column.push(value);
        }
    }

    if columns.first().is_none_or(Vec::is_empty) {
        return Err(LabFitError::EmptyFile);
    }
    Ok(RawTable {
        headers: Some(headers),
        columns,
    })
}

fn cell_value(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(v) => *v,
        Data::Int(v) => *v as f64,
        Data::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
