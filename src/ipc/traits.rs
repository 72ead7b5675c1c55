//! The service manager interface.

use crate::error::UnitResult;

use super::types::{JobMode, ServiceTimestamps, TimerProperties, UnitFileChange, UnitListing};

/// Calls exposed by the host service manager.
///
/// Implementations are constructed once and passed by reference into
/// every component that issues manager calls. Calls are blocking; callers
/// sharing one handle across threads must serialize access themselves.
pub trait UnitManager: Send + Sync {
    /// Re-read unit files from disk.
    fn reload(&self) -> UnitResult<()>;

    /// Queue a start job. Returns the job object path.
    fn start_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String>;

    fn stop_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String>;

    fn restart_unit(&self, unit: &str, mode: JobMode) -> UnitResult<String>;

    /// Enable unit files given by name or absolute path.
    ///
    /// `runtime` limits the change to the current boot; `force` replaces
    /// conflicting symlinks.
    fn enable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> UnitResult<Vec<UnitFileChange>>;

    fn disable_unit_files(&self, files: &[String], runtime: bool)
        -> UnitResult<Vec<UnitFileChange>>;

    /// Remove runtime, state, cache or log data of a unit.
    ///
    /// `mask` holds any of `configuration`, `state`, `logs`, `cache`,
    /// `runtime`, `fdstore` or `all`.
    fn clean_unit(&self, unit: &str, mask: &[&str]) -> UnitResult<()>;

    /// Load a unit and return its object path.
    fn load_unit(&self, unit: &str) -> UnitResult<String>;

    /// `(path, state)` pairs of unit files matching any pattern.
    fn list_unit_files_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<(String, String)>>;

    fn list_units_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<UnitListing>>;

    fn escape_path(&self, path: &str) -> UnitResult<String>;

    /// Activation timestamps of the unit at `object_path`.
    fn unit_timestamps(&self, object_path: &str) -> UnitResult<ServiceTimestamps>;

    /// Timer state of the timer unit at `object_path`.
    fn timer_properties(&self, object_path: &str) -> UnitResult<TimerProperties>;
}
