//! Service and unit name validation.
//!
//! Names end up in file names and in manager calls, so anything that could
//! escape the unit directory or break a `Key=Value` line is rejected.

use crate::error::{UnitError, ValidationErrorKind};

/// Unit suffixes the manager calls accept from us.
const UNIT_SUFFIXES: &[&str] = &[
    ".service",
    ".timer",
    ".target",
    ".socket",
    ".path",
    ".slice",
    ".mount",
    ".automount",
    ".swap",
    ".device",
    ".scope",
];

/// Validate a service spec name.
///
/// # Example
///
/// ```
/// use taskflow_units::validation::validate_spec_name;
///
/// assert!(validate_spec_name("nightly-job").is_ok());
/// assert!(validate_spec_name("").is_err());
/// assert!(validate_spec_name("../etc").is_err());
/// ```
pub fn validate_spec_name(name: &str) -> Result<(), UnitError> {
    if name.trim().is_empty() {
        return Err(UnitError::Validation {
            kind: ValidationErrorKind::EmptyName,
        });
    }

    if name.contains('/') || name.contains('\\') {
        return Err(invalid(name, "must not contain path separators"));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(invalid(name, "must not contain control characters"));
    }

    if name == "." || name == ".." {
        return Err(invalid(name, "reserved name"));
    }

    Ok(())
}

/// Validate a unit name passed to a manager call.
pub fn validate_unit_name(unit: &str) -> Result<(), UnitError> {
    let well_formed = !unit.is_empty()
        && !unit.contains('/')
        && !unit.chars().any(|c| c.is_control() || c.is_whitespace())
        && UNIT_SUFFIXES.iter().any(|s| unit.ends_with(s) && unit.len() > s.len());

    if !well_formed {
        return Err(UnitError::Validation {
            kind: ValidationErrorKind::InvalidUnit {
                unit: unit.to_string(),
            },
        });
    }
    Ok(())
}

fn invalid(name: &str, message: &str) -> UnitError {
    UnitError::Validation {
        kind: ValidationErrorKind::InvalidName {
            name: name.to_string(),
            message: message.to_string(),
        },
    }
}
