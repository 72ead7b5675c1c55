//! Container runtime seam.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::UnitResult;

/// A container the runtime should create for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Defaults to the owning service's name.
    #[serde(default)]
    pub name: Option<String>,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            name: None,
            image: image.into(),
            command: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Creates and deletes containers backing container services.
pub trait ContainerLifecycleProvider: Send + Sync {
    /// Create (but do not start) the container.
    fn create(&self, spec: &ContainerSpec) -> UnitResult<()>;

    /// Remove the named container. Removing a container that does not
    /// exist succeeds.
    fn delete(&self, name: &str) -> UnitResult<()>;
}
