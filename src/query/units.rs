//! Read-only views of manager state for managed units.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::UnitResult;
use crate::ipc::{UnitListing, UnitManager};
use crate::model::UNIT_PREFIX;

use super::pattern::{unit_match_pattern, UnitType};

/// A calendar trigger with its next fire time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarTrigger {
    pub base: String,
    pub spec: String,
    pub next_start: Option<DateTime<Utc>>,
}

/// A monotonic trigger with its offset and next fire time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonotonicTrigger {
    pub base: String,
    pub offset_usec: u64,
    pub next_start: Option<DateTime<Utc>>,
}

/// Live schedule state of a managed service and its timer.
///
/// Timestamps the manager reports as unset are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScheduleInfo {
    pub last_start: Option<DateTime<Utc>>,
    pub last_finish: Option<DateTime<Utc>>,
    pub next_start: Option<DateTime<Utc>>,
    pub timers_calendar: Vec<CalendarTrigger>,
    pub timers_monotonic: Vec<MonotonicTrigger>,
}

/// Convert a manager timestamp (microseconds since the epoch).
///
/// Zero is the manager's "never" value; values outside the representable
/// range also map to `None`.
pub fn usec_to_datetime(usec: u64) -> Option<DateTime<Utc>> {
    if usec == 0 {
        return None;
    }
    let usec = i64::try_from(usec).ok()?;
    DateTime::from_timestamp_micros(usec)
}

/// Queries scoped to managed units.
pub struct UnitQuery<'a> {
    manager: &'a dyn UnitManager,
}

impl<'a> UnitQuery<'a> {
    pub fn new(manager: &'a dyn UnitManager) -> Self {
        Self { manager }
    }

    /// Loaded managed units.
    pub fn get_units(
        &self,
        unit_type: Option<UnitType>,
        filter: Option<&str>,
        states: &[String],
    ) -> UnitResult<Vec<UnitListing>> {
        let pattern = unit_match_pattern(unit_type, filter);
        debug!(pattern = %pattern, "Listing units");
        self.manager.list_units_by_patterns(states, &[pattern])
    }

    /// Paths of managed unit files.
    pub fn get_unit_files(
        &self,
        unit_type: Option<UnitType>,
        filter: Option<&str>,
        states: &[String],
    ) -> UnitResult<Vec<String>> {
        Ok(self
            .get_unit_file_states(unit_type, filter, states)?
            .into_keys()
            .collect())
    }

    /// Managed unit file path to enablement state.
    pub fn get_unit_file_states(
        &self,
        unit_type: Option<UnitType>,
        filter: Option<&str>,
        states: &[String],
    ) -> UnitResult<BTreeMap<String, String>> {
        let pattern = unit_match_pattern(unit_type, filter);
        let files = self
            .manager
            .list_unit_files_by_patterns(states, &[pattern.clone()])?;
        if files.is_empty() {
            error!(pattern = %pattern, "No unit files found matching pattern");
        }
        Ok(files.into_iter().collect())
    }

    /// Escape `path` the way the manager names path-based units.
    pub fn escape_path(&self, path: &str) -> UnitResult<String> {
        self.manager.escape_path(path)
    }

    /// Schedule state of `unit`, which may be given with or without the
    /// managed prefix and a `.service` / `.timer` suffix.
    pub fn get_schedule_info(&self, unit: &str) -> UnitResult<ScheduleInfo> {
        let stem = schedule_stem(unit);

        let service_path = self.manager.load_unit(&format!("{}.service", stem))?;
        let timestamps = self.manager.unit_timestamps(&service_path)?;

        let timer_path = self.manager.load_unit(&format!("{}.timer", stem))?;
        let timer = self.manager.timer_properties(&timer_path)?;

        let timers_calendar: Vec<CalendarTrigger> = timer
            .calendar
            .into_iter()
            .map(|t| CalendarTrigger {
                base: t.base,
                spec: t.spec,
                next_start: usec_to_datetime(t.next_elapse_usec),
            })
            .collect();
        let timers_monotonic = timer
            .monotonic
            .into_iter()
            .map(|t| MonotonicTrigger {
                base: t.base,
                offset_usec: t.offset_usec,
                next_start: usec_to_datetime(t.next_elapse_usec),
            })
            .collect();

        let next_start = usec_to_datetime(timer.next_elapse_realtime_usec)
            .or_else(|| timers_calendar.iter().filter_map(|t| t.next_start).min());

        Ok(ScheduleInfo {
            last_start: usec_to_datetime(timestamps.active_enter_usec),
            last_finish: usec_to_datetime(timestamps.active_exit_usec),
            next_start,
            timers_calendar,
            timers_monotonic,
        })
    }
}

fn schedule_stem(unit: &str) -> String {
    let stem = unit.replace(".service", "").replace(".timer", "");
    if stem.starts_with(UNIT_PREFIX) {
        stem
    } else {
        format!("{}{}", UNIT_PREFIX, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{CalendarTimer, InMemoryManager, ServiceTimestamps, TimerProperties};

    const JAN_2024_USEC: u64 = 1_704_067_200_000_000;

    #[test]
    fn test_usec_normalization() {
        assert_eq!(usec_to_datetime(0), None);
        assert_eq!(usec_to_datetime(u64::MAX), None);
        assert_eq!(usec_to_datetime(i64::MAX as u64), None);
        assert_eq!(
            usec_to_datetime(JAN_2024_USEC).unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_schedule_stem() {
        assert_eq!(schedule_stem("x"), "taskflow-x");
        assert_eq!(schedule_stem("taskflow-x.timer"), "taskflow-x");
        assert_eq!(schedule_stem("x.service"), "taskflow-x");
    }

    #[test]
    fn test_schedule_info_falls_back_to_calendar_minimum() {
        let bus = InMemoryManager::new();
        bus.set_timestamps(
            "taskflow-x.service",
            ServiceTimestamps {
                active_enter_usec: JAN_2024_USEC,
                active_exit_usec: 0,
            },
        );
        bus.set_timer(
            "taskflow-x.timer",
            TimerProperties {
                next_elapse_realtime_usec: 0,
                calendar: vec![
                    CalendarTimer {
                        base: "OnCalendar".into(),
                        spec: "daily".into(),
                        next_elapse_usec: JAN_2024_USEC + 7_200_000_000,
                    },
                    CalendarTimer {
                        base: "OnCalendar".into(),
                        spec: "hourly".into(),
                        next_elapse_usec: JAN_2024_USEC + 3_600_000_000,
                    },
                    CalendarTimer {
                        base: "OnCalendar".into(),
                        spec: "never".into(),
                        next_elapse_usec: 0,
                    },
                ],
                monotonic: Vec::new(),
            },
        );

        let info = UnitQuery::new(&bus).get_schedule_info("x").unwrap();
        assert_eq!(info.last_start, usec_to_datetime(JAN_2024_USEC));
        assert_eq!(info.last_finish, None);
        assert_eq!(info.next_start, usec_to_datetime(JAN_2024_USEC + 3_600_000_000));
        assert_eq!(info.timers_calendar.len(), 3);
        assert_eq!(info.timers_calendar[2].next_start, None);
    }

    #[test]
    fn test_schedule_info_without_timers() {
        let bus = InMemoryManager::new();
        let info = UnitQuery::new(&bus).get_schedule_info("x").unwrap();
        assert_eq!(info, ScheduleInfo::default());
    }

    #[test]
    fn test_unit_file_states_only_managed() {
        let bus = InMemoryManager::new();
        bus.add_unit_file("/u/taskflow-a.service");
        bus.add_unit_file("/u/taskflow-a.timer");
        bus.add_unit_file("/u/sshd.service");

        let query = UnitQuery::new(&bus);
        let states = query.get_unit_file_states(None, None, &[]).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states["/u/taskflow-a.timer"], "disabled");

        let timers = query
            .get_unit_files(Some(UnitType::Timer), None, &[])
            .unwrap();
        assert_eq!(timers, vec!["/u/taskflow-a.timer"]);

        let units = query.get_units(Some(UnitType::Service), Some("a"), &[]).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_name, "taskflow-a.service");
    }
}
