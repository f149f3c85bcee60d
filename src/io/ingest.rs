//! Tabular data ingest.
//!
//! This module turns a measurement file into a validated `DataSet`:
//!
//! - dispatch on extension (spreadsheet, JSON, delimited text)
//! - strict structure checks with typed errors (exit code 2)
//! - column-role detection from header text (`io::detect`)
//! - a short text preview for the presentation layer
//!
//! No fitting logic lives here.

use std::fs;
use std::path::Path;

use crate::domain::{ColumnFormat, DataSet, Locale, RawTable};
use crate::error::{ErrorReporter, LabFitError, LogReporter, Result};
use crate::io::detect::{column_indices, detect_format};
use crate::io::{json, spreadsheet};

/// Rows shown in a preview table.
pub const PREVIEW_ROWS: usize = 10;

/// Header plus the first rows of the loaded table, already formatted.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

impl Preview {
    pub fn from_raw(raw: &RawTable) -> Self {
        let headers = (0..raw.n_columns())
            .map(|j| match raw.headers.as_ref().and_then(|h| h.get(j)) {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => format!("col{}", j + 1),
            })
            .collect();
        let rows = (0..raw.n_rows().min(PREVIEW_ROWS))
            .map(|i| raw.columns.iter().map(|col| format!("{}", col[i])).collect())
            .collect();
        Self {
            headers,
            rows,
            total_rows: raw.n_rows(),
        }
    }
}

/// Reader output.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub dataset: DataSet,
    pub preview: Preview,
}

/// Load a measurement file, reporting failures through the log.
pub fn read_tabular(path: &Path, locale: Locale) -> Result<LoadedData> {
    read_tabular_with(path, locale, &LogReporter)
}

/// Load a measurement file; every failure is handed to `reporter` before it
/// is returned.
pub fn read_tabular_with(path: &Path, locale: Locale, reporter: &dyn ErrorReporter) -> Result<LoadedData> {
    match load(path) {
        Ok(loaded) => {
            log::info!(
                "loaded {} points from '{}' ({})",
                loaded.dataset.len(),
                path.display(),
                loaded.dataset.column_format()
            );
            Ok(loaded)
        }
        Err(err) => {
            reporter.report(err.title(locale), &err);
            Err(err)
        }
    }
}

fn load(path: &Path) -> Result<LoadedData> {
    if !path.exists() {
        return Err(LabFitError::FileNotFound(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (raw, format) = match extension.as_str() {
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => {
            let raw = spreadsheet::read_first_sheet(path)?;
            let format = detect_format(raw.n_columns(), raw.headers.as_deref());
            (raw, format)
        }
        "json" => (json::read_json_table(path)?, ColumnFormat::Json),
        _ => {
            let content = fs::read_to_string(path).map_err(|e| LabFitError::io(path, e))?;
            let raw = parse_delimited(&content)?;
            let format = detect_format(raw.n_columns(), raw.headers.as_deref());
            (raw, format)
        }
    };

    let preview = Preview::from_raw(&raw);
    let dataset = dataset_from_detected(raw, format)?;
    Ok(LoadedData { dataset, preview })
}

/// Build a `DataSet` from a raw table whose layout was auto-detected.
pub fn dataset_from_detected(raw: RawTable, format: ColumnFormat) -> Result<DataSet> {
    let n = raw.n_rows();
    let column = |idx: Option<usize>| -> Vec<f64> {
        idx.and_then(|j| raw.columns.get(j))
            .cloned()
            .unwrap_or_else(|| vec![0.0; n])
    };
    let (xi, sxi, yi, syi) = column_indices(&format);
    let x = column(Some(xi));
    let sigma_x = column(sxi);
    let y = column(Some(yi));
    let sigma_y = column(syi);
    DataSet::new(x, sigma_x, y, sigma_y, format, raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Semicolon,
    Comma,
    Whitespace,
}

impl Delimiter {
    fn detect(line: &str) -> Self {
        if line.contains(';') {
            Delimiter::Semicolon
        } else if line.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }

    fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Semicolon => Some(b';'),
            Delimiter::Comma => Some(b','),
            Delimiter::Whitespace => None,
        }
    }

    /// Comma decimals are only unambiguous when the comma is not the separator.
    fn accepts_decimal_comma(self) -> bool {
        self != Delimiter::Comma
    }
}

fn normalize_number(token: &str) -> String {
    token.trim().replace(',', ".")
}

fn looks_like_header(line: &str) -> bool {
    let first = line
        .split(|c: char| c.is_whitespace() || c == ';' || c == ',')
        .find(|t| !t.is_empty())
        .unwrap_or("");
    normalize_number(first).parse::<f64>().is_err()
}

fn split_fields(line: &str, delimiter: Delimiter) -> Vec<String> {
    match delimiter {
        Delimiter::Whitespace => line.split_whitespace().map(str::to_string).collect(),
        Delimiter::Semicolon => line.split(';').map(|t| t.trim().to_string()).collect(),
        Delimiter::Comma => line.split(',').map(|t| t.trim().to_string()).collect(),
    }
}

/// Parse delimited text into a raw table.
///
/// Line numbers in errors are physical 1-based lines of the file, so comment
/// and header lines are counted.
pub fn parse_delimited(content: &str) -> Result<RawTable> {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let has_header = lines.first().is_some_and(|(_, first)| looks_like_header(first));
    let header_line = if has_header { Some(lines.remove(0).1) } else { None };

    let Some(&(_, first_data)) = lines.first() else {
        return Err(LabFitError::EmptyFile);
    };

    let delimiter = Delimiter::detect(first_data);
    let records = read_records(&lines, delimiter)?;

    let expected = records.first().map_or(0, |(_, fields)| fields.len());
    if expected <= 1 {
        return Err(LabFitError::SingleColumn);
    }
    if expected > 4 {
        return Err(LabFitError::TooManyColumns { found: expected });
    }
    for (line, fields) in &records {
        if fields.len() != expected {
            return Err(LabFitError::ColumnCountMismatch {
                line: *line,
                expected,
                found: fields.len(),
            });
        }
    }

    let mut columns = vec![Vec::with_capacity(records.len()); expected];
    for (line, fields) in &records {
        for (j, cell) in fields.iter().enumerate() {
            let value = parse_cell(cell, delimiter).ok_or_else(|| LabFitError::NonNumeric {
                line: *line,
                column: j + 1,
                value: cell.clone(),
            })?;
            columns[j].push(value);
        }
    }

    let headers = header_line.map(|h| split_fields(h, delimiter));
    log::debug!(
        "delimited text: {:?} delimiter, {} columns, {} rows, header={}",
        delimiter,
        expected,
        records.len(),
        headers.is_some()
    );
    Ok(RawTable { headers, columns })
}

fn parse_cell(cell: &str, delimiter: Delimiter) -> Option<f64> {
    let text = if delimiter.accepts_decimal_comma() {
        normalize_number(cell)
    } else {
        cell.trim().to_string()
    };
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split every data line into fields, keeping its physical line number.
fn read_records(lines: &[(usize, &str)], delimiter: Delimiter) -> Result<Vec<(usize, Vec<String>)>> {
    let Some(byte) = delimiter.byte() else {
        return Ok(lines
            .iter()
            .map(|(line, text)| (*line, split_fields(text, delimiter)))
            .collect());
    };

    let joined: String = lines.iter().map(|(_, text)| *text).collect::<Vec<_>>().join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(byte)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());

    let mut out = Vec::with_capacity(lines.len());
    for (idx, result) in reader.records().enumerate() {
        let line = lines.get(idx).map_or(idx + 1, |(line, _)| *line);
        let record = result.map_err(|e| LabFitError::NonNumeric {
            line,
            column: 0,
            value: e.to_string(),
        })?;
        out.push((line, record.iter().map(str::to_string).collect()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn standard_four_columns_round_trip() {
        let file = write_temp(
            ".csv",
            "x;sigma_x;y;sigma_y\n1,0;0,1;2,0;0,2\n2,0;0,1;4,1;0,2\n3,0;0,1;5,9;0,3\n",
        );
        let loaded = read_tabular(file.path(), Locale::En).unwrap();
        let ds = &loaded.dataset;
        assert_eq!(ds.column_format(), &ColumnFormat::Standard);
        assert!(ds.column_format().label().contains("standard"));
        for (got, want) in ds.x().iter().zip([1.0, 2.0, 3.0]) {
            assert_relative_eq!(*got, want);
        }
        for (got, want) in ds.y().iter().zip([2.0, 4.1, 5.9]) {
            assert_relative_eq!(*got, want);
        }
        for (got, want) in ds.sigma_y().iter().zip([0.2, 0.2, 0.3]) {
            assert_relative_eq!(*got, want);
        }
        assert_eq!(loaded.preview.headers, vec!["x", "sigma_x", "y", "sigma_y"]);
        assert_eq!(loaded.preview.rows.len(), 3);
    }

    #[test]
    fn three_column_headers_choose_the_axis() {
        for (header, expect_x) in [("x y sigma_y", false), ("x y err_y", false), ("x dx y", true)] {
            let content = format!("{header}\n1 0.1 2\n2 0.1 4\n");
            let raw = parse_delimited(&content).unwrap();
            let format = detect_format(raw.n_columns(), raw.headers.as_deref());
            let ds = dataset_from_detected(raw, format).unwrap();
            if expect_x {
                assert_eq!(ds.column_format(), &ColumnFormat::XSigmaXY);
                assert_eq!(ds.sigma_y(), &[0.0, 0.0]);
                assert_eq!(ds.y(), &[2.0, 4.0]);
            } else {
                assert_eq!(ds.column_format(), &ColumnFormat::XYSigmaY);
                assert_eq!(ds.sigma_x(), &[0.0, 0.0]);
                assert_eq!(ds.sigma_y(), &[2.0, 4.0]);
            }
        }
    }

    #[test]
    fn mismatch_reports_physical_line() {
        let err = parse_delimited("x y\n1 2\n3\n").unwrap_err();
        match err {
            LabFitError::ColumnCountMismatch { line, expected, found } => {
                assert_eq!((line, expected, found), (3, 2, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
        let err = parse_delimited("# comment\nx,y\n1,2\n\n3\n").unwrap_err();
        assert!(matches!(err, LabFitError::ColumnCountMismatch { line: 5, .. }));
    }

    #[test]
    fn structural_errors_are_distinct() {
        assert!(matches!(parse_delimited("# only\n\n").unwrap_err(), LabFitError::EmptyFile));
        assert!(matches!(parse_delimited("x y\n").unwrap_err(), LabFitError::EmptyFile));
        assert!(matches!(parse_delimited("1\n2\n").unwrap_err(), LabFitError::SingleColumn));
        assert!(matches!(
            parse_delimited("1 2 3 4 5\n").unwrap_err(),
            LabFitError::TooManyColumns { found: 5 }
        ));
        assert!(matches!(
            parse_delimited("1 2\n3 abc\n").unwrap_err(),
            LabFitError::NonNumeric { line: 2, column: 2, .. }
        ));
        assert!(matches!(
            parse_delimited("1 2\n3 inf\n").unwrap_err(),
            LabFitError::NonNumeric { .. }
        ));
    }

    #[test]
    fn delimiters_and_decimal_commas() {
        let raw = parse_delimited("1,5;2,5\n3,5;4,5\n").unwrap();
        assert_eq!(raw.columns, vec![vec![1.5, 3.5], vec![2.5, 4.5]]);
        let raw = parse_delimited("1.5, 2.5\n3.5, 4.5\n").unwrap();
        assert_eq!(raw.columns, vec![vec![1.5, 3.5], vec![2.5, 4.5]]);
        let raw = parse_delimited("1.5 \t 2.5\n3.5    4.5\n").unwrap();
        assert_eq!(raw.columns, vec![vec![1.5, 3.5], vec![2.5, 4.5]]);
    }

    #[test]
    fn missing_file_is_reported_once() {
        use std::cell::Cell;

        struct Counting(Cell<usize>);
        impl ErrorReporter for Counting {
            fn report(&self, title: &str, _error: &LabFitError) {
                assert_eq!(title, "Error de archivo");
                self.0.set(self.0.get() + 1);
            }
        }

        let reporter = Counting(Cell::new(0));
        let err = read_tabular_with(Path::new("/definitely/not/here.csv"), Locale::Es, &reporter).unwrap_err();
        assert!(matches!(err, LabFitError::FileNotFound(_)));
        assert_eq!(reporter.0.get(), 1);
    }

    #[test]
    fn preview_generates_column_names() {
        let raw = parse_delimited("1 2\n3 4\n").unwrap();
        let preview = Preview::from_raw(&raw);
        assert_eq!(preview.headers, vec!["col1", "col2"]);
        assert_eq!(preview.rows[1], vec!["3", "4"]);
    }
}
