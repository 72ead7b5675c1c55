//! Outcomes of best-effort multi-unit operations.

use std::fmt;
use std::path::PathBuf;

/// Step of a multi-unit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Stop,
    Disable,
    Clean,
    DeleteContainer,
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitAction::Stop => "stop",
            UnitAction::Disable => "disable",
            UnitAction::Clean => "clean",
            UnitAction::DeleteContainer => "delete container",
        })
    }
}

/// A per-unit failure that was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Unit or container name.
    pub unit: String,
    pub action: UnitAction,
    pub message: String,
}

impl UnitFailure {
    pub fn new(unit: impl Into<String>, action: UnitAction, message: impl fmt::Display) -> Self {
        Self {
            unit: unit.into(),
            action,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not {} {}: {}", self.action, self.unit, self.message)
    }
}

/// What `remove` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub deleted_files: Vec<PathBuf>,
    pub deleted_containers: Vec<String>,
    pub failures: Vec<UnitFailure>,
}

impl RemovalReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
