//! Error types for taskflow units.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
