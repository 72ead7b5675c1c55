//! Container-backed services.
//!
//! [`ContainerService`] builds specs whose commands drive a container;
//! [`ContainerLifecycleProvider`] creates and deletes the containers.

mod docker;
mod provider;
mod service;

pub use docker::DockerCli;
pub use provider::{ContainerLifecycleProvider, ContainerSpec};
pub use service::{referenced_containers, ContainerBacking, ContainerService};
