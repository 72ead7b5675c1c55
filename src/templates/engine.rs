//! Tera template engine wrapper.
//!
//! Provides the built-in unit file templates and optional overrides.

use std::path::Path;
use std::sync::Arc;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::error::UnitError;

/// Template name for timer units.
pub const TIMER_TEMPLATE: &str = "timer.unit.tera";
/// Template name for service units.
pub const SERVICE_TEMPLATE: &str = "service.unit.tera";

const TIMER_SOURCE: &str = "[Unit]\n\
Description={{ description }}\n\
[Timer]\n\
{% for directive in timer %}{{ directive }}\n{% endfor %}\
[Install]\n\
WantedBy={{ wanted_by }}\n";

const SERVICE_SOURCE: &str = "{% if unit %}[Unit]\n\
{% for directive in unit %}{{ directive }}\n{% endfor %}{% endif %}\
[Service]\n\
{% for directive in service %}{{ directive }}\n{% endfor %}\
[Install]\n\
WantedBy={{ wanted_by }}\n";

const BUILTIN_TEMPLATES: [(&str, &str); 2] = [
    (TIMER_TEMPLATE, TIMER_SOURCE),
    (SERVICE_TEMPLATE, SERVICE_SOURCE),
];

/// Template engine for rendering unit files.
///
/// Wraps Tera and provides a simplified interface for template operations.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
}

impl TemplateEngine {
    /// Engine with only the built-in unit templates.
    pub fn builtin() -> Result<Self, UnitError> {
        Ok(Self {
            tera: Arc::new(builtin_tera()?),
        })
    }

    /// Engine with the built-in templates, overridden by any `.tera` files
    /// of the same name found under `template_dir`.
    pub fn with_overrides(template_dir: &Path) -> Result<Self, UnitError> {
        let pattern = template_dir.join("**/*.tera");
        let pattern_str = pattern.to_string_lossy();

        debug!(pattern = %pattern_str, "Loading template overrides");

        let mut tera = Tera::new(&pattern_str).map_err(|e| UnitError::Template {
            message: format!(
                "Failed to load templates from '{}': {}",
                template_dir.display(),
                e
            ),
        })?;
        tera.autoescape_on(vec![]);

        let loaded: Vec<String> = tera.get_template_names().map(str::to_string).collect();
        for (name, source) in BUILTIN_TEMPLATES {
            if loaded.iter().any(|n| n == name) {
                debug!(template = name, "Using template override");
                continue;
            }
            tera.add_raw_template(name, source)
                .map_err(|e| UnitError::Template {
                    message: format!("Failed to compile built-in template '{}': {}", name, e),
                })?;
        }

        info!(
            directory = %template_dir.display(),
            count = tera.get_template_names().count(),
            "Template engine initialized"
        );

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Render a template with the given context.
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String, UnitError> {
        self.tera
            .render(template_name, context)
            .map_err(|e| UnitError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })
    }
}

fn builtin_tera() -> Result<Tera, UnitError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_templates(BUILTIN_TEMPLATES.to_vec())
        .map_err(|e| UnitError::Template {
            message: format!("Failed to compile built-in templates: {}", e),
        })?;
    Ok(tera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn service_context(unit: &[&str], service: &[&str]) -> Context {
        let mut context = Context::new();
        context.insert("unit", unit);
        context.insert("service", service);
        context.insert("wanted_by", "default.target");
        context
    }

    #[test]
    fn test_builtin_templates_present() {
        let engine = TemplateEngine::builtin().unwrap();
        assert!(engine.tera.get_template(TIMER_TEMPLATE).is_ok());
        assert!(engine.tera.get_template(SERVICE_TEMPLATE).is_ok());
    }

    #[test]
    fn test_render_service_with_unit_section() {
        let engine = TemplateEngine::builtin().unwrap();
        let rendered = engine
            .render(
                SERVICE_TEMPLATE,
                &service_context(&["Description=x"], &["ExecStart=/bin/true"]),
            )
            .unwrap();
        assert_eq!(
            rendered,
            "[Unit]\nDescription=x\n[Service]\nExecStart=/bin/true\n[Install]\nWantedBy=default.target\n"
        );
    }

    #[test]
    fn test_render_service_without_unit_section() {
        let engine = TemplateEngine::builtin().unwrap();
        let rendered = engine
            .render(SERVICE_TEMPLATE, &service_context(&[], &["ExecStart=a && b"]))
            .unwrap();
        assert!(!rendered.contains("[Unit]"));
        // No HTML escaping of directive values.
        assert!(rendered.starts_with("[Service]\nExecStart=a && b\n"));
    }

    #[test]
    fn test_render_timer() {
        let engine = TemplateEngine::builtin().unwrap();
        let mut context = Context::new();
        context.insert("description", "timer for x");
        context.insert("timer", &["OnCalendar=daily"]);
        context.insert("wanted_by", "timers.target");
        let rendered = engine.render(TIMER_TEMPLATE, &context).unwrap();
        assert_eq!(
            rendered,
            "[Unit]\nDescription=timer for x\n[Timer]\nOnCalendar=daily\n[Install]\nWantedBy=timers.target\n"
        );
    }

    #[test]
    fn test_override_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(TIMER_TEMPLATE),
            "# custom\n[Timer]\n{% for directive in timer %}{{ directive }}\n{% endfor %}",
        )
        .unwrap();

        let engine = TemplateEngine::with_overrides(dir.path()).unwrap();
        let mut context = Context::new();
        context.insert("description", "ignored");
        context.insert("timer", &["OnCalendar=daily"]);
        context.insert("wanted_by", "timers.target");
        let rendered = engine.render(TIMER_TEMPLATE, &context).unwrap();
        assert!(rendered.starts_with("# custom\n"));
        let service = engine
            .render(SERVICE_TEMPLATE, &service_context(&[], &["ExecStart=/bin/true"]))
            .unwrap();
        assert!(service.starts_with("[Service]\n"));
    }

    #[test]
    fn test_missing_template() {
        let engine = TemplateEngine::builtin().unwrap();
        assert!(engine.render("nonexistent.tera", &Context::new()).is_err());
    }
}
