//! Service manifests.
//!
//! A manifest is a TOML file with one `[[services]]` table per service:
//!
//! ```toml
//! [[services]]
//! name = "nightly-job"
//! start_command = "python etl.py"
//! exec_env = { kind = "conda", env = "etl" }
//!
//! [[services.start_schedule]]
//! kind = "calendar"
//! expression = "*-*-* 02:00:00"
//!
//! [[containers]]
//! service = "cache"
//! mode = "existing"
//! container = "redis"
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::container::{ContainerBacking, ContainerService, ContainerSpec};
use crate::error::{UnitError, ValidationErrorKind};
use crate::model::{ExecEnv, Schedule, ServiceSpec};

/// Services declared in a manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub services: Vec<ManifestEntry>,
    #[serde(default)]
    pub containers: Vec<ContainerEntry>,
}

/// One service of a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub spec: ServiceSpec,
    /// Environment the commands are wrapped to run in.
    #[serde(default)]
    pub exec_env: Option<ExecEnv>,
}

/// A service whose commands drive a container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerEntry {
    /// Name of the service the container runs under.
    pub service: String,
    #[serde(flatten)]
    pub mode: ContainerMode,
    #[serde(default)]
    pub start_schedule: Vec<Schedule>,
    #[serde(default)]
    pub stop_schedule: Vec<Schedule>,
}

/// How a [`ContainerEntry`] gets its container.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContainerMode {
    /// Start and stop a container that already exists.
    Existing { container: String },
    /// Create the container once, then start and stop it.
    Managed { container: ContainerSpec },
    /// Hand `identifier` to the run launcher on every start.
    Run {
        identifier: String,
        container: ContainerSpec,
    },
}

impl ContainerEntry {
    pub fn into_service(self, launcher: &str) -> Result<ContainerService, UnitError> {
        let mut service = match self.mode {
            ContainerMode::Existing { container } => ContainerService::start_existing(
                ContainerBacking::Existing(container),
                &self.service,
            )?,
            ContainerMode::Managed { container } => ContainerService::start_existing(
                ContainerBacking::Managed(container),
                &self.service,
            )?,
            ContainerMode::Run {
                identifier,
                container,
            } => ContainerService::run(container, &self.service, &identifier, launcher)?,
        };
        service.service.start_schedule = self.start_schedule;
        service.service.stop_schedule = self.stop_schedule;
        Ok(service)
    }
}

impl Manifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, UnitError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| UnitError::Config {
            message: format!("Failed to read manifest '{}': {}", path.display(), e),
        })?;
        Self::from_toml(&content).map_err(|e| UnitError::Config {
            message: format!("Invalid manifest '{}': {}", path.display(), e),
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, UnitError> {
        toml::from_str(content).map_err(|e| UnitError::Config {
            message: e.to_string(),
        })
    }

    /// Validated plain services and container services, in declaration
    /// order, with commands wrapped for their environment.
    ///
    /// Service names must be unique across both lists.
    pub fn into_plan(self, launcher: &str) -> Result<ManifestPlan, UnitError> {
        let mut seen = BTreeSet::new();
        let mut plan = ManifestPlan::default();

        for entry in self.services {
            let mut spec = entry.spec;
            spec.validate()?;
            check_unique(&mut seen, &spec.name)?;
            if let Some(env) = &entry.exec_env {
                spec.wrap_commands(env);
            }
            plan.services.push(spec);
        }

        for entry in self.containers {
            let service = entry.into_service(launcher)?;
            check_unique(&mut seen, &service.service.name)?;
            plan.containers.push(service);
        }

        Ok(plan)
    }
}

/// Everything a manifest asks to create.
#[derive(Debug, Clone, Default)]
pub struct ManifestPlan {
    pub services: Vec<ServiceSpec>,
    pub containers: Vec<ContainerService>,
}

impl ManifestPlan {
    pub fn len(&self) -> usize {
        self.services.len() + self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_unique(seen: &mut BTreeSet<String>, name: &str) -> Result<(), UnitError> {
    if seen.insert(name.to_string()) {
        return Ok(());
    }
    Err(UnitError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: "name".to_string(),
            message: format!("service '{}' is declared twice", name),
        },
    })
}
