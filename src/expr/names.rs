//! Parameter-name validation.
//!
//! Shared by the equation compiler (declared and extracted names) and by any
//! tool that accepts parameter names from the user.

use std::collections::HashSet;

use crate::error::{LabFitError, Result};
use crate::expr::functions::collides_with_builtin;

const BANNED: &[char] = &[
    '(', ')', '[', ']', '{', '}', '+', '-', '*', '/', '^', '=', ',', ';', ':', '.', '\'', '"', '\\',
    '|', '&', '%', '$', '#', '@', '!', '?', '<', '>', '~', '`',
];

/// Check each name in order; the first problem found is returned.
pub fn validate_parameter_names<S: AsRef<str>>(names: &[S], x_symbol: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(LabFitError::EmptyParameterName);
        }
        if let Some(ch) = name.chars().find(|c| c.is_whitespace() || BANNED.contains(c)) {
            return Err(LabFitError::InvalidParameterCharacter {
                name: name.to_string(),
                ch,
            });
        }
        if let Some(ch) = name.chars().next().filter(char::is_ascii_digit) {
            return Err(LabFitError::InvalidParameterCharacter {
                name: name.to_string(),
                ch,
            });
        }
        if collides_with_builtin(name) || name.eq_ignore_ascii_case(x_symbol) {
            return Err(LabFitError::ReservedParameterName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(LabFitError::DuplicateParameterName(name.to_string()));
        }
    }
    Ok(())
}
