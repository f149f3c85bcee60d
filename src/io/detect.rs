//! Column-role detection from header text.
//!
//! Detection never fails: when headers are absent or ambiguous it falls back to
//! "uncertainty in y" for 3 columns and the standard `x, σx, y, σy` order for 4.

use crate::domain::ColumnFormat;

/// Header substrings that mark an x-uncertainty column.
pub const SIGMA_X_TOKENS: &[&str] = &[
    "sigma_x", "unc_x", "uncx", "sigmax", "inc_x", "incx", "dx", "err_x", "errx",
];

/// Header substrings that mark a y-uncertainty column.
pub const SIGMA_Y_TOKENS: &[&str] = &[
    "sigma_y", "unc_y", "uncy", "sigmay", "inc_y", "incy", "dy", "err_y", "erry",
];

pub(crate) fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').to_lowercase()
}

fn matches_any(header: Option<&str>, tokens: &[&str]) -> bool {
    let Some(header) = header else {
        return false;
    };
    let header = normalize_header_name(header);
    tokens.iter().any(|t| header.contains(t))
}

pub fn is_sigma_x_header(header: Option<&str>) -> bool {
    matches_any(header, SIGMA_X_TOKENS)
}

pub fn is_sigma_y_header(header: Option<&str>) -> bool {
    matches_any(header, SIGMA_Y_TOKENS)
}

/// Decide the layout of a 2-, 3- or 4-column table.
///
/// `headers` may be `None` (no header line) or shorter than the column count.
/// Any count above 4 is treated as 4; callers validate the count beforehand.
pub fn detect_format(n_columns: usize, headers: Option<&[String]>) -> ColumnFormat {
    let header = |idx: usize| headers.and_then(|h| h.get(idx)).map(String::as_str);

    match n_columns {
        0..=2 => ColumnFormat::TwoColumns,
        3 => {
            if is_sigma_x_header(header(1)) {
                log::debug!("column 2 header {:?} names an x uncertainty", header(1));
                ColumnFormat::XSigmaXY
            } else {
                ColumnFormat::XYSigmaY
            }
        }
        _ => {
            let second_is_sx = is_sigma_x_header(header(1));
            let third_is_sx = is_sigma_x_header(header(2));
            if !is_sigma_y_header(header(3)) && headers.is_some() {
                log::debug!("column 4 header {:?} has no σy token; assuming σy anyway", header(3));
            }
            if third_is_sx && !second_is_sx {
                ColumnFormat::Alternate
            } else {
                ColumnFormat::Standard
            }
        }
    }
}

/// Column index of `(x, σx, y, σy)` for an auto-detected layout.
///
/// `None` means the axis has no uncertainty column and is zero-filled.
pub fn column_indices(format: &ColumnFormat) -> (usize, Option<usize>, usize, Option<usize>) {
    match format {
        ColumnFormat::XYSigmaY => (0, None, 1, Some(2)),
        ColumnFormat::XSigmaXY => (0, Some(1), 2, None),
        ColumnFormat::Standard => (0, Some(1), 2, Some(3)),
        ColumnFormat::Alternate => (0, Some(2), 1, Some(3)),
        ColumnFormat::TwoColumns | ColumnFormat::Json | ColumnFormat::Manual(_) => (0, None, 1, None),
    }
}
