//! Container runtime driven through its command line.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ContainerErrorKind, UnitError, UnitResult};
use crate::executor::{summarize_output, SubprocessBuilder, SubprocessResult};

use super::provider::{ContainerLifecycleProvider, ContainerSpec};

/// [`ContainerLifecycleProvider`] that shells out to `docker` (or a
/// CLI-compatible runtime such as `podman`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn run(&self, args: &[String]) -> UnitResult<SubprocessResult> {
        SubprocessBuilder::new(&self.binary)
            .args(args)
            .timeout(self.timeout)
            .run()
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(120))
    }
}

/// Arguments for `<runtime> create`.
pub(crate) fn create_args(spec: &ContainerSpec, name: &str) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];
    for (key, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

impl ContainerLifecycleProvider for DockerCli {
    fn create(&self, spec: &ContainerSpec) -> UnitResult<()> {
        let name = spec.name.as_deref().ok_or_else(|| UnitError::Container {
            kind: ContainerErrorKind::RuntimeFailed {
                message: format!("container for image '{}' has no name", spec.image),
            },
        })?;

        let result = self.run(&create_args(spec, name))?;
        if !result.success {
            return Err(UnitError::Container {
                kind: ContainerErrorKind::RuntimeFailed {
                    message: format!(
                        "{} create {} failed: {}",
                        self.binary,
                        name,
                        summarize_output(&result.stderr, 5)
                    ),
                },
            });
        }

        info!(container = %name, image = %spec.image, "Container created");
        Ok(())
    }

    fn delete(&self, name: &str) -> UnitResult<()> {
        let args = ["rm".to_string(), "--force".to_string(), name.to_string()];
        let result = self.run(&args)?;
        if result.success {
            info!(container = %name, "Container deleted");
            return Ok(());
        }
        if result.stderr.contains("No such container") {
            debug!(container = %name, "Container already absent");
            return Ok(());
        }
        Err(UnitError::Container {
            kind: ContainerErrorKind::RuntimeFailed {
                message: format!(
                    "{} rm {} failed: {}",
                    self.binary,
                    name,
                    summarize_output(&result.stderr, 5)
                ),
            },
        })
    }
}
