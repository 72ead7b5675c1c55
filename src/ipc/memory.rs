//! In-process service manager.
//!
//! Keeps unit file, enablement and activity state in memory and records
//! every call, so lifecycle code can be exercised without a running
//! systemd.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{UnitError, UnitResult};

use super::traits::UnitManager;
use super::types::{JobMode, ServiceTimestamps, TimerProperties, UnitFileChange, UnitListing};

const UNIT_PATH_ROOT: &str = "/org/freedesktop/systemd1/unit";

/// A call received by [`InMemoryManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCall {
    Reload,
    Start(String),
    Stop(String),
    Restart(String),
    Enable(Vec<String>),
    Disable(Vec<String>),
    Clean(String),
    Load(String),
    ListUnitFiles(Vec<String>),
    ListUnits(Vec<String>),
}

#[derive(Debug, Clone)]
struct UnitFile {
    path: String,
    enabled: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<ManagerCall>,
    unit_files: BTreeMap<String, UnitFile>,
    active: BTreeSet<String>,
    timestamps: BTreeMap<String, ServiceTimestamps>,
    timers: BTreeMap<String, TimerProperties>,
    failures: BTreeSet<(String, String)>,
}

/// [`UnitManager`] that keeps all state in process.
#[derive(Default)]
pub struct InMemoryManager {
    state: Mutex<State>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `method` fail for `unit`. An empty `unit` fails every call of
    /// that method.
    pub fn fail_on(&self, method: &str, unit: &str) {
        self.state()
            .failures
            .insert((method.to_string(), unit.to_string()));
    }

    /// Register a unit file without enabling it.
    pub fn add_unit_file(&self, path: &str) {
        self.state().unit_files.insert(
            basename(path),
            UnitFile {
                path: path.to_string(),
                enabled: false,
            },
        );
    }

    pub fn set_timestamps(&self, unit: &str, timestamps: ServiceTimestamps) {
        self.state().timestamps.insert(unit.to_string(), timestamps);
    }

    pub fn set_timer(&self, unit: &str, properties: TimerProperties) {
        self.state().timers.insert(unit.to_string(), properties);
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.state().calls.clone()
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.state()
            .unit_files
            .get(unit)
            .map(|f| f.enabled)
            .unwrap_or(false)
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.state().active.contains(unit)
    }

    /// Names of enabled units, sorted.
    pub fn enabled_units(&self) -> Vec<String> {
        self.state()
            .unit_files
            .iter()
            .filter(|(_, f)| f.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of every known unit file, sorted.
    pub fn unit_file_names(&self) -> Vec<String> {
        self.state().unit_files.keys().cloned().collect()
    }

    fn check(state: &State, method: &str, unit: &str) -> UnitResult<()> {
        let failing = state.failures.contains(&(method.to_string(), unit.to_string()))
            || state.failures.contains(&(method.to_string(), String::new()));
        if failing {
            return Err(UnitError::bus(method, format!("injected failure for '{}'", unit)));
        }
        Ok(())
    }

    fn require_unit(state: &State, method: &str, unit: &str) -> UnitResult<()> {
        if !state.unit_files.contains_key(unit) {
            return Err(UnitError::bus(
                method,
                format!("Unit {} not found.", unit),
            ));
        }
        Ok(())
    }
}

impl UnitManager for InMemoryManager {
    fn reload(&self) -> UnitResult<()> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Reload);
        Self::check(&state, "Reload", "")?;
        // Forget unit files that were deleted from disk.
        state
            .unit_files
            .retain(|_, f| !f.path.starts_with('/') || Path::new(&f.path).exists());
        Ok(())
    }

    fn start_unit(&self, unit: &str, _mode: JobMode) -> UnitResult<String> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Start(unit.to_string()));
        Self::check(&state, "StartUnit", unit)?;
        Self::require_unit(&state, "StartUnit", unit)?;
        state.active.insert(unit.to_string());
        Ok(format!("/org/freedesktop/systemd1/job/{}", state.calls.len()))
    }

    fn stop_unit(&self, unit: &str, _mode: JobMode) -> UnitResult<String> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Stop(unit.to_string()));
        Self::check(&state, "StopUnit", unit)?;
        state.active.remove(unit);
        Ok(format!("/org/freedesktop/systemd1/job/{}", state.calls.len()))
    }

    fn restart_unit(&self, unit: &str, _mode: JobMode) -> UnitResult<String> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Restart(unit.to_string()));
        Self::check(&state, "RestartUnit", unit)?;
        Self::require_unit(&state, "RestartUnit", unit)?;
        state.active.insert(unit.to_string());
        Ok(format!("/org/freedesktop/systemd1/job/{}", state.calls.len()))
    }

    fn enable_unit_files(
        &self,
        files: &[String],
        _runtime: bool,
        _force: bool,
    ) -> UnitResult<Vec<UnitFileChange>> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Enable(files.to_vec()));
        for file in files {
            Self::check(&state, "EnableUnitFiles", &basename(file))?;
        }
        let mut changes = Vec::with_capacity(files.len());
        for file in files {
            let name = basename(file);
            let entry = state.unit_files.entry(name.clone()).or_insert(UnitFile {
                path: file.clone(),
                enabled: false,
            });
            if file.starts_with('/') {
                entry.path = file.clone();
            }
            entry.enabled = true;
            changes.push(UnitFileChange {
                change_type: "symlink".to_string(),
                file: format!("default.target.wants/{}", name),
                destination: entry.path.clone(),
            });
        }
        debug!(count = changes.len(), "Enabled unit files");
        Ok(changes)
    }

    fn disable_unit_files(
        &self,
        files: &[String],
        _runtime: bool,
    ) -> UnitResult<Vec<UnitFileChange>> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Disable(files.to_vec()));
        for file in files {
            Self::check(&state, "DisableUnitFiles", &basename(file))?;
        }
        let mut changes = Vec::new();
        for file in files {
            let name = basename(file);
            if let Some(entry) = state.unit_files.get_mut(&name) {
                if entry.enabled {
                    entry.enabled = false;
                    changes.push(UnitFileChange {
                        change_type: "unlink".to_string(),
                        file: format!("default.target.wants/{}", name),
                        destination: String::new(),
                    });
                }
            }
        }
        Ok(changes)
    }

    fn clean_unit(&self, unit: &str, _mask: &[&str]) -> UnitResult<()> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Clean(unit.to_string()));
        Self::check(&state, "CleanUnit", unit)?;
        state.timestamps.remove(unit);
        Ok(())
    }

    fn load_unit(&self, unit: &str) -> UnitResult<String> {
        let mut state = self.state();
        state.calls.push(ManagerCall::Load(unit.to_string()));
        Self::check(&state, "LoadUnit", unit)?;
        Ok(format!("{}/{}", UNIT_PATH_ROOT, bus_label_escape(unit)))
    }

    fn list_unit_files_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<(String, String)>> {
        let mut state = self.state();
        state.calls.push(ManagerCall::ListUnitFiles(patterns.to_vec()));
        Self::check(&state, "ListUnitFilesByPatterns", "")?;
        Ok(state
            .unit_files
            .iter()
            .filter(|(name, _)| matches_any(patterns, name))
            .map(|(_, f)| {
                let file_state = if f.enabled { "enabled" } else { "disabled" };
                (f.path.clone(), file_state.to_string())
            })
            .filter(|(_, s)| states.is_empty() || states.iter().any(|want| want == s))
            .collect())
    }

    fn list_units_by_patterns(
        &self,
        states: &[String],
        patterns: &[String],
    ) -> UnitResult<Vec<UnitListing>> {
        let mut state = self.state();
        state.calls.push(ManagerCall::ListUnits(patterns.to_vec()));
        Self::check(&state, "ListUnitsByPatterns", "")?;
        Ok(state
            .unit_files
            .keys()
            .filter(|name| matches_any(patterns, name))
            .map(|name| {
                let (active_state, sub_state) = if state.active.contains(name) {
                    ("active", "running")
                } else {
                    ("inactive", "dead")
                };
                UnitListing {
                    unit_name: name.clone(),
                    load_state: "loaded".to_string(),
                    active_state: active_state.to_string(),
                    sub_state: sub_state.to_string(),
                    unit_path: format!("{}/{}", UNIT_PATH_ROOT, bus_label_escape(name)),
                    job_path: "/".to_string(),
                    ..UnitListing::default()
                }
            })
            .filter(|u| states.is_empty() || states.iter().any(|s| *s == u.active_state))
            .collect())
    }

    fn escape_path(&self, path: &str) -> UnitResult<String> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok("-".to_string());
        }
        let mut out = String::with_capacity(trimmed.len());
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '/' => out.push('-'),
                '.' if i == 0 => out.push_str("\\x2e"),
                c if c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '.' => out.push(c),
                c => {
                    let mut buf = [0u8; 4];
                    for b in c.encode_utf8(&mut buf).bytes() {
                        out.push_str(&format!("\\x{:02x}", b));
                    }
                }
            }
        }
        Ok(out)
    }

    fn unit_timestamps(&self, object_path: &str) -> UnitResult<ServiceTimestamps> {
        let state = self.state();
        let unit = unit_for_path(object_path);
        Ok(state.timestamps.get(&unit).copied().unwrap_or_default())
    }

    fn timer_properties(&self, object_path: &str) -> UnitResult<TimerProperties> {
        let state = self.state();
        let unit = unit_for_path(object_path);
        Ok(state.timers.get(&unit).cloned().unwrap_or_default())
    }
}

fn basename(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

/// Escape a unit name into an object path label the way systemd does.
fn bus_label_escape(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len());
    for (i, b) in unit.bytes().enumerate() {
        if b.is_ascii_alphabetic() || (i > 0 && b.is_ascii_digit()) {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02x}", b));
        }
    }
    out
}

fn bus_label_unescape(label: &str) -> String {
    let bytes = label.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn unit_for_path(object_path: &str) -> String {
    let label = object_path
        .strip_prefix(UNIT_PATH_ROOT)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(object_path);
    bus_label_unescape(label)
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| glob_match(p, name))
}

/// Shell-style match supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
