//! Directive value validation.
//!
//! Unit files are line oriented: a value carrying a line break would start
//! a new directive or section when rendered.

use crate::error::{UnitError, ValidationErrorKind};

/// Validate a value rendered after `Key=` in a unit file.
///
/// # Example
///
/// ```
/// use taskflow_units::validation::validate_directive_value;
///
/// assert!(validate_directive_value("start_command", "python etl.py --day 1").is_ok());
/// assert!(validate_directive_value("start_command", "run\nExecStartPre=/bin/sh").is_err());
/// ```
pub fn validate_directive_value(field: &str, value: &str) -> Result<(), UnitError> {
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(invalid(field, "must not contain line breaks or control characters"));
    }
    Ok(())
}

/// Validate an environment variable name.
pub fn validate_env_name(key: &str) -> Result<(), UnitError> {
    let param = format!("env.{}", key);
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(invalid(&param, "must be letters, digits and '_', not starting with a digit"));
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> UnitError {
    UnitError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: field.to_string(),
            message: message.to_string(),
        },
    }
}
