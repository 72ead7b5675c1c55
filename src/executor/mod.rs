//! Subprocess execution.

mod output;
mod subprocess;

pub use output::summarize_output;
pub use subprocess::{SubprocessBuilder, SubprocessResult};
