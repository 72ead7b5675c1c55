//! Error types for taskflow units.

use thiserror::Error;

/// Main error type for unit synthesis and lifecycle operations.
#[derive(Error, Debug)]
pub enum UnitError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid specification input.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// A call to the service manager failed.
    #[error("Manager call {method} failed: {message}")]
    Bus { method: String, message: String },

    /// Container runtime errors.
    #[error("Container error: {kind}")]
    Container { kind: ContainerErrorKind },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Run history errors.
    #[error("History error: {kind}")]
    History { kind: HistoryErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Service name cannot be empty")]
    EmptyName,

    #[error("Invalid service name '{name}': {message}")]
    InvalidName { name: String, message: String },

    #[error("Service '{name}' has an empty start command")]
    EmptyCommand { name: String },

    #[error("Invalid unit name: {unit}")]
    InvalidUnit { unit: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Container error kinds.
#[derive(Error, Debug)]
pub enum ContainerErrorKind {
    #[error("Container identifier could not be resolved for service '{service}'")]
    UnresolvedIdentifier { service: String },

    #[error("No container provider configured for container '{name}'")]
    NoProvider { name: String },

    #[error("Container runtime command failed: {message}")]
    RuntimeFailed { message: String },

    #[error("Container runtime timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Run history error kinds.
#[derive(Error, Debug)]
pub enum HistoryErrorKind {
    #[error("Unsupported history store dialect: {dialect}")]
    UnsupportedDialect { dialect: String },

    #[error("Invalid history store URL: {url}")]
    InvalidUrl { url: String },

    #[error("History store lock poisoned")]
    LockPoisoned,
}

/// Result type alias for unit operations.
pub type UnitResult<T> = Result<T, UnitError>;

impl UnitError {
    /// Build a `Bus` error for the named manager method.
    pub fn bus(method: &str, err: impl std::fmt::Display) -> Self {
        UnitError::Bus {
            method: method.to_string(),
            message: err.to_string(),
        }
    }
}
