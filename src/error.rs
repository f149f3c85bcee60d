//! Error type shared by the reader, the compiler and the fit executor.
//!
//! Every variant maps to a process exit code (for the `labfit` binary) and to a
//! short localized title (for whatever dialog the presentation layer shows).

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{ColumnRole, Locale};

#[derive(Error, Debug)]
pub enum LabFitError {
    #[error("File not found: '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The file is empty (no data lines after removing blank lines, comments and header).")]
    EmptyFile,

    #[error("Only one column was found; the file is likely in the wrong format (expected 2, 3 or 4 columns separated by ';', ',' or spaces).")]
    SingleColumn,

    #[error("Too many columns ({found}). Use 2 columns (x, y), 3 columns (x, y, σy or x, σx, y) or 4 columns (x, σx, y, σy).")]
    TooManyColumns { found: usize },

    #[error("Insufficient columns ({found}); at least 2 columns (x, y) are required.")]
    InsufficientColumns { found: usize },

    #[error("Line {line}: expected {expected} columns but found {found}.")]
    ColumnCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}, column {column}: '{value}' is not a finite number.")]
    NonNumeric {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("Invalid JSON data: {0}")]
    Json(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Column roles: {0}")]
    RoleAssignment(String),

    #[error("Column roles: exactly one '{0}' column is required.")]
    MissingRole(ColumnRole),

    #[error("Column roles: '{0}' is assigned to more than one column.")]
    DuplicateRole(ColumnRole),

    #[error("Invalid equation '{text}': {cause}")]
    Formula { text: String, cause: String },

    #[error("Cannot differentiate with respect to '{parameter}': {cause}")]
    Derivative { parameter: String, cause: String },

    #[error("Parameter names must not be empty.")]
    EmptyParameterName,

    #[error("'{0}' is a reserved name (function, constant or independent variable).")]
    ReservedParameterName(String),

    #[error("Parameter '{name}' contains the invalid character '{ch}'.")]
    InvalidParameterCharacter { name: String, ch: char },

    #[error("Parameter '{0}' is declared more than once.")]
    DuplicateParameterName(String),

    #[error("No model has been compiled; enter an equation before fitting.")]
    MissingModel,

    #[error("Method '{method}' is not available for this data: {reason}")]
    MethodUnavailable { method: String, reason: String },

    #[error("Invalid fit input: {0}")]
    Validation(String),

    #[error("Singular system: {0}")]
    Singular(String),

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for labfit operations.
pub type Result<T> = std::result::Result<T, LabFitError>;

impl LabFitError {
    pub fn formula(text: impl Into<String>, cause: impl Into<String>) -> Self {
        LabFitError::Formula {
            text: text.into(),
            cause: cause.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabFitError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code used by the `labfit` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            LabFitError::FileNotFound(_)
            | LabFitError::Io { .. }
            | LabFitError::EmptyFile
            | LabFitError::SingleColumn
            | LabFitError::TooManyColumns { .. }
            | LabFitError::InsufficientColumns { .. }
            | LabFitError::ColumnCountMismatch { .. }
            | LabFitError::NonNumeric { .. }
            | LabFitError::Json(_)
            | LabFitError::Spreadsheet(_)
            | LabFitError::RoleAssignment(_)
            | LabFitError::MissingRole(_)
            | LabFitError::DuplicateRole(_) => 2,
            LabFitError::Formula { .. }
            | LabFitError::Derivative { .. }
            | LabFitError::EmptyParameterName
            | LabFitError::ReservedParameterName(_)
            | LabFitError::InvalidParameterCharacter { .. }
            | LabFitError::DuplicateParameterName(_)
            | LabFitError::MissingModel => 3,
            LabFitError::MethodUnavailable { .. }
            | LabFitError::Validation(_)
            | LabFitError::Singular(_)
            | LabFitError::Numerical(_) => 4,
            LabFitError::Internal(_) => 5,
        }
    }

    /// Short title for an error dialog.
    pub fn title(&self, locale: Locale) -> &'static str {
        let (en, es) = match self {
            LabFitError::FileNotFound(_) | LabFitError::Io { .. } => ("File error", "Error de archivo"),
            LabFitError::EmptyFile
            | LabFitError::SingleColumn
            | LabFitError::TooManyColumns { .. }
            | LabFitError::InsufficientColumns { .. }
            | LabFitError::ColumnCountMismatch { .. }
            | LabFitError::NonNumeric { .. }
            | LabFitError::Json(_)
            | LabFitError::Spreadsheet(_) => ("Data format error", "Error de formato de datos"),
            LabFitError::RoleAssignment(_)
            | LabFitError::MissingRole(_)
            | LabFitError::DuplicateRole(_) => ("Column assignment error", "Error de asignación de columnas"),
            LabFitError::Formula { .. } | LabFitError::Derivative { .. } => {
                ("Equation error", "Error en la ecuación")
            }
            LabFitError::EmptyParameterName
            | LabFitError::ReservedParameterName(_)
            | LabFitError::InvalidParameterCharacter { .. }
            | LabFitError::DuplicateParameterName(_) => ("Parameter error", "Error en los parámetros"),
            LabFitError::MissingModel
            | LabFitError::MethodUnavailable { .. }
            | LabFitError::Validation(_) => ("Fit error", "Error de ajuste"),
            LabFitError::Singular(_) | LabFitError::Numerical(_) => ("Numerical error", "Error numérico"),
            LabFitError::Internal(_) => ("Internal error", "Error interno"),
        };
        match locale {
            Locale::En => en,
            Locale::Es => es,
        }
    }
}

/// Hook the presentation layer uses to show an error before it propagates.
///
/// The reader calls `report` exactly once per failed load, then returns the error.
pub trait ErrorReporter {
    fn report(&self, title: &str, error: &LabFitError);
}

/// Default reporter: writes the error to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, title: &str, error: &LabFitError) {
        log::error!("{title}: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_line_and_counts() {
        let err = LabFitError::ColumnCountMismatch {
            line: 3,
            expected: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "Line 3: expected 2 columns but found 1.");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn titles_follow_locale() {
        let err = LabFitError::MissingModel;
        assert_eq!(err.title(Locale::En), "Fit error");
        assert_eq!(err.title(Locale::Es), "Error de ajuste");
    }

    #[test]
    fn reserved_and_invalid_character_are_distinct() {
        let reserved = LabFitError::ReservedParameterName("sin".into());
        let invalid = LabFitError::InvalidParameterCharacter {
            name: "a*b".into(),
            ch: '*',
        };
        assert_ne!(reserved.to_string(), invalid.to_string());
        assert!(matches!(reserved, LabFitError::ReservedParameterName(_)));
    }
}
