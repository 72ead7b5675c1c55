//! Services backed by a container.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::error::{ContainerErrorKind, UnitError, UnitResult, ValidationErrorKind};
use crate::model::ServiceSpec;

use super::provider::ContainerSpec;

/// Matches the commands `start_existing` writes into a unit.
static CONTAINER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"docker (?:start|stop) ([\w-]+)").expect("container marker pattern is valid")
});

/// Names of containers started or stopped by commands in `unit_text`.
pub fn referenced_containers(unit_text: &str) -> BTreeSet<String> {
    CONTAINER_MARKER
        .captures_iter(unit_text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Where the container of a [`ContainerService`] comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerBacking {
    /// A container that already exists in the runtime.
    Existing(String),
    /// A container created through the provider before the units are.
    Managed(ContainerSpec),
    /// A container started by a launcher command each time the service runs.
    Launched(ContainerSpec),
}

/// A [`ServiceSpec`] whose commands drive a container.
///
/// The service goes through the same synthesis and lifecycle path as any
/// other spec; `service` may be customized (schedules, relations, ...)
/// before it is created.
#[derive(Debug, Clone)]
pub struct ContainerService {
    pub service: ServiceSpec,
    pub backing: ContainerBacking,
}

impl ContainerService {
    /// Service that starts and stops a persistent container by name.
    ///
    /// A managed container without a name takes `service_name`.
    pub fn start_existing(backing: ContainerBacking, service_name: &str) -> UnitResult<Self> {
        let backing = match backing {
            ContainerBacking::Managed(spec) => {
                ContainerBacking::Managed(name_or_default(spec, service_name))
            }
            other => other,
        };
        let name = match &backing {
            ContainerBacking::Existing(name) => name.clone(),
            ContainerBacking::Managed(spec) | ContainerBacking::Launched(spec) => {
                spec.name.clone().unwrap_or_default()
            }
        };
        validate_container_name(&name)?;

        let service = ServiceSpec::new(service_name, format!("docker start {}", name))
            .stop_command(format!("docker stop {}", name))
            .restart_command(format!("docker restart {}", name))
            .blocking(false);
        service.validate()?;

        Ok(Self { service, backing })
    }

    /// Service that runs `container` through `launcher` on every start.
    ///
    /// `identifier` is passed to the launcher so it can find the container
    /// definition again; it must be non-empty and free of whitespace.
    pub fn run(
        container: ContainerSpec,
        service_name: &str,
        identifier: &str,
        launcher: &str,
    ) -> UnitResult<Self> {
        if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
            return Err(UnitError::Container {
                kind: ContainerErrorKind::UnresolvedIdentifier {
                    service: service_name.to_string(),
                },
            });
        }
        let container = name_or_default(container, service_name);
        if let Some(name) = &container.name {
            validate_container_name(name)?;
        }

        let service = ServiceSpec::new(service_name, format!("{} {}", launcher, identifier));
        service.validate()?;

        Ok(Self {
            service,
            backing: ContainerBacking::Launched(container),
        })
    }

    /// Container the provider must create before the units, if any.
    pub fn container_to_create(&self) -> Option<&ContainerSpec> {
        match &self.backing {
            ContainerBacking::Managed(spec) => Some(spec),
            _ => None,
        }
    }
}

fn name_or_default(mut spec: ContainerSpec, service_name: &str) -> ContainerSpec {
    if spec.name.is_none() {
        info!(service = %service_name, "Setting container name to service name");
        spec.name = Some(service_name.to_string());
    }
    spec
}

/// Names must survive the round trip through unit text, so only word
/// characters and `-` are allowed.
fn validate_container_name(name: &str) -> UnitResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(UnitError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "container".to_string(),
                message: format!("invalid container name '{}'", name),
            },
        });
    }
    Ok(())
}
