//! Hardware and system load constraints.
//!
//! Each constraint becomes one `[Unit]` directive. A `silent` constraint is
//! emitted as a `Condition*=` (the start is skipped quietly when unmet);
//! otherwise it is an `Assert*=` and the start fails.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operator for hardware constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[default]
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = ">")]
    Greater,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "=",
            Comparison::NotEqual => "!=",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Greater => ">",
        };
        f.write_str(op)
    }
}

/// Requirement on host hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardwareConstraint {
    /// Installed memory in bytes.
    Memory {
        bytes: u64,
        #[serde(default)]
        comparison: Comparison,
        #[serde(default)]
        silent: bool,
    },
    /// Number of usable CPUs.
    Cpus {
        count: u32,
        #[serde(default)]
        comparison: Comparison,
        #[serde(default)]
        silent: bool,
    },
}

impl HardwareConstraint {
    pub fn unit_directive(&self) -> String {
        match self {
            HardwareConstraint::Memory {
                bytes,
                comparison,
                silent,
            } => format!("{}Memory={}{}", check_prefix(*silent), comparison, bytes),
            HardwareConstraint::Cpus {
                count,
                comparison,
                silent,
            } => format!("{}CPUs={}{}", check_prefix(*silent), comparison, count),
        }
    }
}

/// Averaging window for pressure stall information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PressureTimespan {
    #[serde(rename = "10sec")]
    TenSeconds,
    #[serde(rename = "1min")]
    OneMinute,
    #[default]
    #[serde(rename = "5min")]
    FiveMinutes,
}

impl fmt::Display for PressureTimespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PressureTimespan::TenSeconds => "10sec",
            PressureTimespan::OneMinute => "1min",
            PressureTimespan::FiveMinutes => "5min",
        })
    }
}

/// Pressure resource a load constraint watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureKind {
    Cpu,
    Memory,
    Io,
}

/// Upper bound on system pressure at start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLoadConstraint {
    pub kind: PressureKind,
    pub max_percent: u8,
    #[serde(default)]
    pub timespan: PressureTimespan,
    #[serde(default)]
    pub silent: bool,
}

impl SystemLoadConstraint {
    pub fn new(kind: PressureKind, max_percent: u8) -> Self {
        Self {
            kind,
            max_percent,
            timespan: PressureTimespan::default(),
            silent: false,
        }
    }

    pub fn unit_directive(&self) -> String {
        let resource = match self.kind {
            PressureKind::Cpu => "CPU",
            PressureKind::Memory => "Memory",
            PressureKind::Io => "IO",
        };
        format!(
            "{}{}Pressure={}%/{}",
            check_prefix(self.silent),
            resource,
            self.max_percent,
            self.timespan
        )
    }
}

fn check_prefix(silent: bool) -> &'static str {
    if silent {
        "Condition"
    } else {
        "Assert"
    }
}

/// Union of the directives contributed by both constraint sets.
pub fn constraint_directives(
    hardware: &[HardwareConstraint],
    load: &[SystemLoadConstraint],
) -> BTreeSet<String> {
    hardware
        .iter()
        .map(HardwareConstraint::unit_directive)
        .chain(load.iter().map(SystemLoadConstraint::unit_directive))
        .collect()
}
