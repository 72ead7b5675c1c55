//! Unit file synthesis and storage.

mod store;
mod synthesizer;

pub use store::UnitStore;
pub use synthesizer::{service_directives, unit_directives, UnitFiles, UnitSynthesizer};
