//! Unit file template rendering.

mod engine;

pub use engine::{TemplateEngine, SERVICE_TEMPLATE, TIMER_TEMPLATE};
