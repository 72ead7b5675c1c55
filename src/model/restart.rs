//! Restart policies.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit conditions under which the manager restarts the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartCondition {
    Always,
    OnSuccess,
    OnFailure,
    OnAbnormal,
    OnAbort,
    OnWatchdog,
}

impl fmt::Display for RestartCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestartCondition::Always => "always",
            RestartCondition::OnSuccess => "on-success",
            RestartCondition::OnFailure => "on-failure",
            RestartCondition::OnAbnormal => "on-abnormal",
            RestartCondition::OnAbort => "on-abort",
            RestartCondition::OnWatchdog => "on-watchdog",
        })
    }
}

/// How (and how often) a failed or exited service is restarted.
///
/// `Delayed` and `Burst` refine `Simple`: both always carry the base
/// `Restart=` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestartPolicy {
    Simple {
        condition: RestartCondition,
    },
    Delayed {
        condition: RestartCondition,
        #[serde(default = "default_delay_secs")]
        delay_secs: u64,
    },
    Burst {
        condition: RestartCondition,
        #[serde(default = "default_restart_limit")]
        restart_limit: u32,
        #[serde(default = "default_window_secs")]
        window_secs: u64,
    },
}

fn default_delay_secs() -> u64 {
    1
}

fn default_restart_limit() -> u32 {
    1000
}

fn default_window_secs() -> u64 {
    1
}

/// Directives contributed by a restart policy, split by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartDirectives {
    pub unit: BTreeSet<String>,
    pub service: BTreeSet<String>,
}

impl RestartPolicy {
    pub fn condition(&self) -> RestartCondition {
        match self {
            RestartPolicy::Simple { condition }
            | RestartPolicy::Delayed { condition, .. }
            | RestartPolicy::Burst { condition, .. } => *condition,
        }
    }

    pub fn directives(&self) -> RestartDirectives {
        let mut out = RestartDirectives::default();
        out.service.insert(format!("Restart={}", self.condition()));
        match self {
            RestartPolicy::Simple { .. } => {}
            RestartPolicy::Delayed { delay_secs, .. } => {
                out.service.insert(format!("RestartSec={}", delay_secs));
            }
            RestartPolicy::Burst {
                restart_limit,
                window_secs,
                ..
            } => {
                out.unit.insert(format!("StartLimitIntervalSec={}", window_secs));
                out.unit.insert(format!("StartLimitBurst={}", restart_limit));
            }
        }
        out
    }
}

impl From<RestartCondition> for RestartPolicy {
    fn from(condition: RestartCondition) -> Self {
        RestartPolicy::Simple { condition }
    }
}
