//! systemd over D-Bus.

use serde::{Deserialize, Serialize};
use tracing::debug;
use zbus::blocking::Connection;
use zbus::proxy::CacheProperties;
use zbus::zvariant::OwnedObjectPath;

use crate::error::{UnitError, UnitResult};

use super::traits::UnitManager;
use super::types::{
    CalendarTimer, JobMode, MonotonicTimer, ServiceTimestamps, TimerProperties, UnitFileChange,
    UnitListing,
};

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1",
    gen_async = false,
    blocking_name = "ManagerProxyBlocking"
)]
trait Manager {
    fn reload(&self) -> zbus::Result<()>;

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<(String, String, String)>)>;

    fn disable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
    ) -> zbus::Result<Vec<(String, String, String)>>;

    fn clean_unit(&self, name: &str, mask: &[&str]) -> zbus::Result<()>;

    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    fn list_unit_files_by_patterns(
        &self,
        states: &[&str],
        patterns: &[&str],
    ) -> zbus::Result<Vec<(String, String)>>;

    #[allow(clippy::type_complexity)]
    fn list_units_by_patterns(
        &self,
        states: &[&str],
        patterns: &[&str],
    ) -> zbus::Result<
        Vec<(
            String,
            String,
            String,
            String,
            String,
            String,
            OwnedObjectPath,
            u32,
            String,
            OwnedObjectPath,
        )>,
    >;

    fn escape_path(&self, path: &str) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1",
    gen_async = false,
    blocking_name = "UnitProxyBlocking"
)]
trait Unit {
    #[zbus(property)]
    fn active_enter_timestamp(&self) -> zbus::Result<u64>;

    #[zbus(property)]
    fn active_exit_timestamp(&self) -> zbus::Result<u64>;
}

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Timer",
    default_service = "org.freedesktop.systemd1",
    gen_async = false,
    blocking_name = "TimerProxyBlocking"
)]
trait Timer {
    #[zbus(property, name = "NextElapseUSecRealtime")]
    fn next_elapse_usec_realtime(&self) -> zbus::Result<u64>;

    #[zbus(property)]
    fn timers_calendar(&self) -> zbus::Result<Vec<(String, String, u64)>>;

    #[zbus(property)]
    fn timers_monotonic(&self) -> zbus::Result<Vec<(String, u64, u64)>>;
}

/// Which manager instance to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusScope {
    /// The per-user manager on the session bus.
    #[default]
    User,
    /// The system manager on the system bus.
    System,
}

impl BusScope {
    /// Flag `systemctl` needs to address this manager, if any.
    pub fn systemctl_flag(self) -> Option<&'static str> {
        match self {
            BusScope::User => Some("--user"),
            BusScope::System => None,
        }
    }
}

/// [`UnitManager`] backed by a D-Bus connection to systemd.
pub struct SystemdBus {
    connection: Connection,
    manager: ManagerProxyBlocking<'static>,
}

impl SystemdBus {
    /// Connect to the manager for `scope`.
    pub fn connect(scope: BusScope) -> UnitResult<Self> {
        let connection = match scope {
            BusScope::User => Connection::session(),
            BusScope::System => Connection::system(),
        }
        .map_err(|e| UnitError::bus("Connect", e))?;
        debug!(scope = ?scope, "Connected to service manager");
        Self::with_connection(connection)
    }

    /// Wrap an existing connection.
    pub fn with_connection(connection: Connection) -> UnitResult<Self> {
        let manager =
            ManagerProxyBlocking::new(&connection).map_err(|e| UnitError::bus("Manager", e))?;
        Ok(Self {
            connection,
            manager,
        })
    }

    fn unit_proxy<'p>(&self, object_path: &'p str) -> UnitResult<UnitProxyBlocking<'p>> {
        UnitProxyBlocking::builder(&self.connection)
            .path(object_path)
            .and_then(|b| b.cache_properties(CacheProperties::No).build())
            .map_err(|e| UnitError::bus("Unit", e))
    }

    fn timer_proxy<'p>(&self, object_path: &'p str) -> UnitResult<TimerProxyBlocking<'p>> {
        TimerProxyBlocking::builder(&self.connection)
            .path(object_path)
            .and_then(|b| b.cache_properties(CacheProperties::No).build())
            .map_err(|e| UnitError::bus("Timer", e))
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl UnitManager for SystemdBus {
    fn reload(&self) -> UnitResult<()> {
        debug!("Reload");
        self.manager.reload().map_err(|e| UnitError::bus("Reload", e))
    }

    fn start_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String> {
        debug!(unit = %unit, mode = %mode, "StartUnit");
        self.manager
            .start_unit(unit, mode.as_str())
            .map(|job| job.as_str().to_string())
            .map_err(|e| UnitError::bus("StartUnit", e))
    }

    fn stop_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String> {
        debug!(unit = %unit, mode = %mode, "StopUnit");
        self.manager
            .stop_unit(unit, mode.as_str())
            .map(|job| job.as_str().to_string())
            .map_err(|e| UnitError::bus("StopUnit", e))
    }

    fn restart_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String> {
        debug!(unit = %unit, mode = %mode, "RestartUnit");
        self.manager
            .restart_unit(unit, mode.as_str())
            .map(|job| job.as_str().to_string())
            .map_err(|e| UnitError::bus("RestartUnit", e))
    }

    fn enable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> UnitResult<Vec<UnitFileChange>> {
        debug!(files = ?files, runtime, force, "EnableUnitFiles");
        let (_carries_install_info, changes) = self
            .manager
            .enable_unit_files(&as_strs(files), runtime, force)
            .map_err(|e| UnitError::bus("EnableUnitFiles", e))?;
        Ok(changes.into_iter().map(UnitFileChange::from).collect())
    }

    fn disable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
    ) -> UnitResult<Vec<UnitFileChange>> {
        debug!(files = ?files, runtime, "DisableUnitFiles");
        let changes = self
            .manager
            .disable_unit_files(&as_strs(files), runtime)
            .map_err(|e| UnitError::bus("DisableUnitFiles", e))?;
        Ok(changes.into_iter().map(UnitFileChange::from).collect())
    }

    fn clean_unit(&self, unit: &str, mask: &[&str]) -> UnitResult<()> {
        debug!(unit = %unit, mask = ?mask, "CleanUnit");
        self.manager
            .clean_unit(unit, mask)
            .map_err(|e| UnitError::bus("CleanUnit", e))
    }

    fn load_unit(&self, unit: &str) -> UnitResult<String> {
        self.manager
            .load_unit(unit)
            .map(|path| path.as_str().to_string())
            .map_err(|e| UnitError::bus("LoadUnit", e))
    }

    fn list_unit_files_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<(String, String)>> {
        self.manager
            .list_unit_files_by_patterns(&as_strs(states), &as_strs(patterns))
            .map_err(|e| UnitError::bus("ListUnitFilesByPatterns", e))
    }

    fn list_units_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<UnitListing>> {
        let units = self
            .manager
            .list_units_by_patterns(&as_strs(states), &as_strs(patterns))
            .map_err(|e| UnitError::bus("ListUnitsByPatterns", e))?;
        Ok(units
            .into_iter()
            .map(
                |(
                    unit_name,
                    description,
                    load_state,
                    active_state,
                    sub_state,
                    followed,
                    unit_path,
                    job_id,
                    job_type,
                    job_path,
                )| UnitListing {
                    unit_name,
                    description,
                    load_state,
                    active_state,
                    sub_state,
                    followed,
                    unit_path: unit_path.as_str().to_string(),
                    job_id,
                    job_type,
                    job_path: job_path.as_str().to_string(),
                },
            )
            .collect())
    }

    fn escape_path(&self, path: &str) -> UnitResult<String> {
        self.manager
            .escape_path(path)
            .map_err(|e| UnitError::bus("EscapePath", e))
    }

    fn unit_timestamps(&self, object_path: &str) -> UnitResult<ServiceTimestamps> {
        let unit = self.unit_proxy(object_path)?;
        Ok(ServiceTimestamps {
            active_enter_usec: unit
                .active_enter_timestamp()
                .map_err(|e| UnitError::bus("Get(ActiveEnterTimestamp)", e))?,
            active_exit_usec: unit
                .active_exit_timestamp()
                .map_err(|e| UnitError::bus("Get(ActiveExitTimestamp)", e))?,
        })
    }

    fn timer_properties(&self, object_path: &str) -> UnitResult<TimerProperties> {
        let timer = self.timer_proxy(object_path)?;
        let next_elapse_realtime_usec = timer
            .next_elapse_usec_realtime()
            .map_err(|e| UnitError::bus("Get(NextElapseUSecRealtime)", e))?;
        let calendar = timer
            .timers_calendar()
            .map_err(|e| UnitError::bus("Get(TimersCalendar)", e))?
            .into_iter()
            .map(|(base, spec, next_elapse_usec)| CalendarTimer {
                base,
                spec,
                next_elapse_usec,
            })
            .collect();
        let monotonic = timer
            .timers_monotonic()
            .map_err(|e| UnitError::bus("Get(TimersMonotonic)", e))?
            .into_iter()
            .map(|(base, offset_usec, next_elapse_usec)| MonotonicTimer {
                base,
                offset_usec,
                next_elapse_usec,
            })
            .collect();
        Ok(TimerProperties {
            next_elapse_realtime_usec,
            calendar,
            monotonic,
        })
    }
}
