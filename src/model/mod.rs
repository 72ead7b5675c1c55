//! Declarative data model.
//!
//! `ServiceSpec` is the aggregate; schedules, constraints, restart policies
//! and relations are leaf values that each know which directives they
//! contribute.

mod constraints;
mod exec_env;
mod relations;
mod restart;
mod schedule;
mod service;

pub use constraints::{
    constraint_directives, Comparison, HardwareConstraint, PressureKind, PressureTimespan,
    SystemLoadConstraint,
};
pub use exec_env::ExecEnv;
pub use relations::{relation_directives, Relation, Relations, UnitRef};
pub use restart::{RestartCondition, RestartDirectives, RestartPolicy};
pub use schedule::{merged_timer_directives, PeriodRelativeTo, PeriodicStart, Schedule};
pub use service::{unit_stem, ArtifactSet, ServiceSpec, STOP_UNIT_PREFIX, UNIT_PREFIX};
