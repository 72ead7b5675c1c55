//! Configuration and service manifests.
//!
//! Settings are loaded from TOML with every field defaulted; manifests
//! declare the services to apply.

mod manifest;
mod settings;

pub use manifest::{ContainerEntry, ContainerMode, Manifest, ManifestEntry, ManifestPlan};
pub use settings::*;
