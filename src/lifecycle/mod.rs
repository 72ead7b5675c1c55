//! Lifecycle orchestration over synthesized units.

mod manager;
mod report;

pub use manager::{is_stop_service, unit_name, LifecycleManager};
pub use report::{RemovalReport, UnitAction, UnitFailure};
