//! Input validation module.
//!
//! Provides validators for service spec names, manager unit names and the
//! values rendered into unit files.

mod directive;
mod service_name;

pub use directive::{validate_directive_value, validate_env_name};
pub use service_name::{validate_spec_name, validate_unit_name};
