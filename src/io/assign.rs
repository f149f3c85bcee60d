//! Manual column-role re-assignment over a previously loaded raw table.

use std::str::FromStr;

use crate::domain::{ColumnFormat, ColumnRole, DataSet, RawTable};
use crate::error::{LabFitError, Result};

/// Parse a comma-separated role list such as `x,ignore,y,sig_y`.
pub fn parse_roles(text: &str) -> Result<Vec<ColumnRole>> {
    text.split(',').map(ColumnRole::from_str).collect()
}

/// Re-interpret `raw` with one role per column.
///
/// Exactly one `x` and one `y` are required; `sig_x`/`sig_y` may appear at most
/// once and are zero-filled when absent.
pub fn reassign_columns(raw: &RawTable, roles: &[ColumnRole]) -> Result<DataSet> {
    if roles.len() != raw.n_columns() {
        return Err(LabFitError::RoleAssignment(format!(
            "{} roles given for {} columns; assign one role per column",
            roles.len(),
            raw.n_columns()
        )));
    }

    let find = |role: ColumnRole| -> Result<Option<usize>> {
        let mut hits = roles.iter().enumerate().filter(|(_, r)| **r == role).map(|(i, _)| i);
        let first = hits.next();
        if hits.next().is_some() {
            return Err(LabFitError::DuplicateRole(role));
        }
        Ok(first)
    };

    let x = find(ColumnRole::X)?.ok_or(LabFitError::MissingRole(ColumnRole::X))?;
    let y = find(ColumnRole::Y)?.ok_or(LabFitError::MissingRole(ColumnRole::Y))?;
    let sx = find(ColumnRole::SigX)?;
    let sy = find(ColumnRole::SigY)?;

    let n = raw.n_rows();
    let column = |idx: Option<usize>| -> Vec<f64> {
        idx.map_or_else(|| vec![0.0; n], |j| raw.columns[j].clone())
    };

    log::info!(
        "columns re-assigned: x=col{}, y=col{}, sig_x={:?}, sig_y={:?}",
        x + 1,
        y + 1,
        sx.map(|j| j + 1),
        sy.map(|j| j + 1)
    );

    DataSet::new(
        column(Some(x)),
        column(sx),
        column(Some(y)),
        column(sy),
        ColumnFormat::Manual(roles.to_vec()),
        raw.clone(),
    )
}
