//! Introspection of managed units.

mod pattern;
mod units;

pub use pattern::{unit_match_pattern, UnitType};
pub use units::{
    usec_to_datetime, CalendarTrigger, MonotonicTrigger, ScheduleInfo, UnitQuery,
};
