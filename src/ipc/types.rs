//! Values exchanged with the service manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a queued job interacts with jobs already pending for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    #[default]
    Replace,
    Fail,
    IgnoreDependencies,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Replace => "replace",
            JobMode::Fail => "fail",
            JobMode::IgnoreDependencies => "ignore-dependencies",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One symlink change reported by enable/disable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFileChange {
    /// `symlink` or `unlink`.
    pub change_type: String,
    pub file: String,
    pub destination: String,
}

impl From<(String, String, String)> for UnitFileChange {
    fn from((change_type, file, destination): (String, String, String)) -> Self {
        Self {
            change_type,
            file,
            destination,
        }
    }
}

/// A loaded unit as reported by `ListUnitsByPatterns`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitListing {
    pub unit_name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub followed: String,
    pub unit_path: String,
    pub job_id: u32,
    pub job_type: String,
    pub job_path: String,
}

/// Raw activation timestamps of a service, in microseconds since the epoch.
///
/// Zero means the transition never happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceTimestamps {
    pub active_enter_usec: u64,
    pub active_exit_usec: u64,
}

/// A calendar trigger of a timer (`TimersCalendar` entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarTimer {
    pub base: String,
    pub spec: String,
    pub next_elapse_usec: u64,
}

/// A monotonic trigger of a timer (`TimersMonotonic` entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonotonicTimer {
    pub base: String,
    pub offset_usec: u64,
    pub next_elapse_usec: u64,
}

/// Schedule state of a timer unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimerProperties {
    pub next_elapse_realtime_usec: u64,
    pub calendar: Vec<CalendarTimer>,
    pub monotonic: Vec<MonotonicTimer>,
}
