//! The declarative service specification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{UnitError, UnitResult, ValidationErrorKind};
use crate::validation::{validate_directive_value, validate_env_name, validate_spec_name};

use super::constraints::{HardwareConstraint, SystemLoadConstraint};
use super::exec_env::ExecEnv;
use super::relations::{Relation, Relations, UnitRef};
use super::restart::RestartPolicy;
use super::schedule::Schedule;

/// Prefix marking every unit this crate manages.
pub const UNIT_PREFIX: &str = "taskflow-";

/// Prefix of the derived unit that stops a service on its stop schedule.
pub const STOP_UNIT_PREFIX: &str = "stop-";

/// Artifact-name stem for a service name.
pub fn unit_stem(name: &str) -> String {
    format!("{}{}", UNIT_PREFIX, name.replace(' ', "_"))
}

/// A unit of recurring or long-running work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Identifies the service; maps to the artifact stem.
    pub name: String,
    pub start_command: String,
    /// Whether `start_command` runs until the work is done.
    #[serde(default = "default_blocking")]
    pub start_command_blocking: bool,
    #[serde(default)]
    pub stop_command: Option<String>,
    #[serde(default)]
    pub restart_command: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_schedule: Vec<Schedule>,
    #[serde(default)]
    pub stop_schedule: Vec<Schedule>,
    #[serde(default)]
    pub relations: Relations,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub hardware_constraints: Vec<HardwareConstraint>,
    #[serde(default)]
    pub system_load_constraints: Vec<SystemLoadConstraint>,
    /// Maximum run time in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub env_file: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default = "default_kill_signal")]
    pub kill_signal: String,
}

fn default_blocking() -> bool {
    true
}

fn default_kill_signal() -> String {
    "SIGTERM".to_string()
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, start_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_command: start_command.into(),
            start_command_blocking: default_blocking(),
            stop_command: None,
            restart_command: None,
            description: None,
            start_schedule: Vec::new(),
            stop_schedule: Vec::new(),
            relations: Relations::new(),
            restart_policy: None,
            hardware_constraints: Vec::new(),
            system_load_constraints: Vec::new(),
            timeout: None,
            env_file: None,
            env: BTreeMap::new(),
            working_directory: None,
            kill_signal: default_kill_signal(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn stop_command(mut self, command: impl Into<String>) -> Self {
        self.stop_command = Some(command.into());
        self
    }

    pub fn restart_command(mut self, command: impl Into<String>) -> Self {
        self.restart_command = Some(command.into());
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.start_command_blocking = blocking;
        self
    }

    pub fn start_schedule(mut self, schedule: Schedule) -> Self {
        self.start_schedule.push(schedule);
        self
    }

    pub fn stop_schedule(mut self, schedule: Schedule) -> Self {
        self.stop_schedule.push(schedule);
        self
    }

    pub fn restart_policy(mut self, policy: impl Into<RestartPolicy>) -> Self {
        self.restart_policy = Some(policy.into());
        self
    }

    pub fn hardware_constraint(mut self, constraint: HardwareConstraint) -> Self {
        self.hardware_constraints.push(constraint);
        self
    }

    pub fn load_constraint(mut self, constraint: SystemLoadConstraint) -> Self {
        self.system_load_constraints.push(constraint);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn env_file(mut self, path: impl Into<String>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn kill_signal(mut self, signal: impl Into<String>) -> Self {
        self.kill_signal = signal.into();
        self
    }

    /// Add targets to a relation, keeping any already present.
    pub fn relate<I, R>(mut self, relation: Relation, targets: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<UnitRef>,
    {
        self.relations
            .entry(relation)
            .or_default()
            .extend(targets.into_iter().map(Into::into));
        self
    }

    /// Rewrite start/stop/restart commands to run inside `env`.
    pub fn wrap_commands(&mut self, env: &ExecEnv) {
        self.start_command = env.wrap(&self.start_command);
        if let Some(cmd) = self.stop_command.as_mut() {
            *cmd = env.wrap(cmd);
        }
        if let Some(cmd) = self.restart_command.as_mut() {
            *cmd = env.wrap(cmd);
        }
    }

    /// Artifact-name stem (`taskflow-<name>`).
    pub fn stem(&self) -> String {
        unit_stem(&self.name)
    }

    /// Check the preconditions synthesis relies on.
    ///
    /// Every value that ends up after a `Key=` must fit on one line, and
    /// raw relation targets must be well-formed unit names.
    pub fn validate(&self) -> UnitResult<()> {
        validate_spec_name(&self.name)?;
        if self.start_command.trim().is_empty() {
            return Err(UnitError::Validation {
                kind: ValidationErrorKind::EmptyCommand {
                    name: self.name.clone(),
                },
            });
        }

        validate_directive_value("start_command", &self.start_command)?;
        validate_directive_value("kill_signal", &self.kill_signal)?;
        let optional = [
            ("stop_command", self.stop_command.as_deref()),
            ("restart_command", self.restart_command.as_deref()),
            ("description", self.description.as_deref()),
            ("env_file", self.env_file.as_deref()),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                validate_directive_value(field, value)?;
            }
        }
        if let Some(dir) = &self.working_directory {
            validate_directive_value("working_directory", &dir.to_string_lossy())?;
        }
        for (key, value) in &self.env {
            validate_env_name(key)?;
            validate_directive_value(&format!("env.{}", key), value)?;
        }

        for target in self.relations.values().flatten() {
            target.validate()?;
        }
        for schedule in self.start_schedule.iter().chain(&self.stop_schedule) {
            schedule.validate()?;
        }
        Ok(())
    }

    /// Paths of the artifacts this spec currently produces under `unit_dir`.
    pub fn artifacts(&self, unit_dir: &Path) -> ArtifactSet {
        let stem = self.stem();
        let stop_stem = format!("{}{}", STOP_UNIT_PREFIX, stem);
        let mut set = ArtifactSet {
            service_files: vec![unit_dir.join(format!("{}.service", stem))],
            timer_files: Vec::new(),
        };
        if !self.start_schedule.is_empty() {
            set.timer_files.push(unit_dir.join(format!("{}.timer", stem)));
        }
        if !self.stop_schedule.is_empty() {
            set.timer_files.push(unit_dir.join(format!("{}.timer", stop_stem)));
            set.service_files
                .push(unit_dir.join(format!("{}.service", stop_stem)));
        }
        set
    }

    /// Every artifact path any shape of this spec could have produced.
    pub fn possible_artifacts(&self, unit_dir: &Path) -> ArtifactSet {
        ArtifactSet::possible(unit_dir, &self.name)
    }
}

/// Service and timer artifact paths belonging to one spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    pub service_files: Vec<PathBuf>,
    pub timer_files: Vec<PathBuf>,
}

impl ArtifactSet {
    /// Every artifact path a service called `name` could own.
    pub fn possible(unit_dir: &Path, name: &str) -> ArtifactSet {
        let stem = unit_stem(name);
        let stop_stem = format!("{}{}", STOP_UNIT_PREFIX, stem);
        ArtifactSet {
            service_files: vec![
                unit_dir.join(format!("{}.service", stem)),
                unit_dir.join(format!("{}.service", stop_stem)),
            ],
            timer_files: vec![
                unit_dir.join(format!("{}.timer", stem)),
                unit_dir.join(format!("{}.timer", stop_stem)),
            ],
        }
    }

    /// Services first, then timers.
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.service_files
            .iter()
            .chain(self.timer_files.iter())
            .cloned()
            .collect()
    }

    /// Keep only paths that exist on disk.
    pub fn existing(&self) -> ArtifactSet {
        ArtifactSet {
            service_files: self.service_files.iter().filter(|p| p.exists()).cloned().collect(),
            timer_files: self.timer_files.iter().filter(|p| p.exists()).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service_files.is_empty() && self.timer_files.is_empty()
    }
}
