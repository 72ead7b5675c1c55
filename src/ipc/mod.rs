//! Service manager IPC.
//!
//! Every call the lifecycle and query layers make goes through the
//! [`UnitManager`] trait. [`SystemdBus`] talks to systemd over D-Bus;
//! [`InMemoryManager`] is an in-process stand-in.

mod memory;
mod systemd;
mod traits;
mod types;

pub use memory::{InMemoryManager, ManagerCall};
pub use systemd::{BusScope, SystemdBus};
pub use traits::UnitManager;
pub use types::{
    CalendarTimer, JobMode, MonotonicTimer, ServiceTimestamps, TimerProperties, UnitFileChange,
    UnitListing,
};
