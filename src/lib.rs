//! Taskflow unit library.
//!
//! Turns declarative service specs into systemd service and timer unit
//! files, drives their lifecycle through the service manager's D-Bus
//! interface and answers queries about the units it manages.

pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod history;
pub mod ipc;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod synth;
pub mod templates;
pub mod validation;

pub use error::{UnitError, UnitResult};
pub use ipc::{BusScope, SystemdBus, UnitManager};
pub use lifecycle::{LifecycleManager, RemovalReport};
pub use model::{Schedule, ServiceSpec};
pub use query::UnitQuery;
pub use synth::UnitSynthesizer;
