//! Timer schedules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::UnitResult;
use crate::validation::validate_directive_value;

/// When a timer should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire on a calendar expression (e.g. `Mon..Fri 09:00`).
    Calendar {
        expression: String,
        /// Catch up on runs missed while the host was down.
        #[serde(default = "default_persistent")]
        persistent: bool,
        #[serde(default = "default_accuracy")]
        accuracy: String,
    },
    /// Fire repeatedly, `period_secs` apart.
    Periodic {
        start_on: PeriodicStart,
        period_secs: u64,
        #[serde(default)]
        relative_to: PeriodRelativeTo,
        #[serde(default = "default_accuracy")]
        accuracy: String,
    },
}

/// Event that arms a periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicStart {
    Boot,
    Login,
    Command,
}

/// Whether the period counts from the last start or the last finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodRelativeTo {
    Start,
    #[default]
    Finish,
}

fn default_persistent() -> bool {
    true
}

fn default_accuracy() -> String {
    "1ms".to_string()
}

impl Schedule {
    /// Calendar schedule with default persistence and accuracy.
    pub fn calendar(expression: impl Into<String>) -> Self {
        Schedule::Calendar {
            expression: expression.into(),
            persistent: default_persistent(),
            accuracy: default_accuracy(),
        }
    }

    /// Periodic schedule with default accuracy.
    pub fn periodic(start_on: PeriodicStart, period_secs: u64, relative_to: PeriodRelativeTo) -> Self {
        Schedule::Periodic {
            start_on,
            period_secs,
            relative_to,
            accuracy: default_accuracy(),
        }
    }

    /// Reject values that cannot be written as a single directive line.
    pub fn validate(&self) -> UnitResult<()> {
        match self {
            Schedule::Calendar {
                expression,
                accuracy,
                ..
            } => {
                validate_directive_value("schedule.expression", expression)?;
                validate_directive_value("schedule.accuracy", accuracy)
            }
            Schedule::Periodic { accuracy, .. } => {
                validate_directive_value("schedule.accuracy", accuracy)
            }
        }
    }

    /// `[Timer]` directives for this schedule.
    pub fn timer_directives(&self) -> BTreeSet<String> {
        let mut entries = BTreeSet::new();
        match self {
            Schedule::Calendar {
                expression,
                persistent,
                accuracy,
            } => {
                entries.insert(format!("OnCalendar={}", expression));
                if *persistent {
                    entries.insert("Persistent=true".to_string());
                }
                entries.insert(format!("AccuracySec={}", accuracy));
            }
            Schedule::Periodic {
                start_on,
                period_secs,
                relative_to,
                accuracy,
            } => {
                let arm = match start_on {
                    PeriodicStart::Boot => "OnBootSec=0",
                    PeriodicStart::Login => "OnStartupSec=0",
                    PeriodicStart::Command => "OnActiveSec=0",
                };
                entries.insert(arm.to_string());
                let repeat = match relative_to {
                    PeriodRelativeTo::Start => "OnUnitActiveSec",
                    PeriodRelativeTo::Finish => "OnUnitInactiveSec",
                };
                entries.insert(format!("{}={}s", repeat, period_secs));
                entries.insert(format!("AccuracySec={}", accuracy));
            }
        }
        entries
    }
}

/// Union of the directives of every schedule in the slot.
pub fn merged_timer_directives(schedules: &[Schedule]) -> BTreeSet<String> {
    schedules
        .iter()
        .flat_map(|s| s.timer_directives())
        .collect()
}
