//! Service spec to unit file translation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tera::Context;
use tracing::debug;

use crate::error::UnitResult;
use crate::ipc::BusScope;
use crate::model::{
    constraint_directives, merged_timer_directives, relation_directives, Schedule, ServiceSpec,
    STOP_UNIT_PREFIX,
};
use crate::templates::{TemplateEngine, SERVICE_TEMPLATE, TIMER_TEMPLATE};

const SERVICE_WANTED_BY: &str = "default.target";
const TIMER_WANTED_BY: &str = "timers.target";

/// Unit file contents keyed by destination path.
pub type UnitFiles = BTreeMap<PathBuf, String>;

/// Renders the unit files for a [`ServiceSpec`].
///
/// Output depends only on the spec's fields: synthesizing an unchanged
/// spec twice yields identical text. Directives inside a section are
/// emitted in sorted order.
#[derive(Clone)]
pub struct UnitSynthesizer {
    unit_dir: PathBuf,
    scope: BusScope,
    templates: TemplateEngine,
}

impl UnitSynthesizer {
    pub fn new(unit_dir: impl Into<PathBuf>, scope: BusScope, templates: TemplateEngine) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            scope,
            templates,
        }
    }

    /// Synthesizer using the built-in templates.
    pub fn with_builtin_templates(unit_dir: impl Into<PathBuf>, scope: BusScope) -> UnitResult<Self> {
        Ok(Self::new(unit_dir, scope, TemplateEngine::builtin()?))
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    pub fn scope(&self) -> BusScope {
        self.scope
    }

    /// Every unit file `spec` produces.
    ///
    /// The primary service is always present. Each non-empty schedule adds
    /// a timer; a stop schedule also adds the service that stops the
    /// primary one.
    pub fn synthesize(&self, spec: &ServiceSpec) -> UnitResult<UnitFiles> {
        spec.validate()?;

        let stem = spec.stem();
        let stop_stem = format!("{}{}", STOP_UNIT_PREFIX, stem);
        let mut files = UnitFiles::new();

        let service_path = self.unit_dir.join(format!("{}.service", stem));
        let service = self.render_service(
            &unit_directives(spec),
            &service_directives(spec),
        )?;
        files.insert(service_path.clone(), service);

        if !spec.start_schedule.is_empty() {
            let description = format!("timer for {}", spec.name);
            files.insert(
                self.unit_dir.join(format!("{}.timer", stem)),
                self.render_timer(&description, &spec.start_schedule)?,
            );
        }

        if !spec.stop_schedule.is_empty() {
            let description = format!("stop timer for {}", spec.name);
            files.insert(
                self.unit_dir.join(format!("{}.timer", stop_stem)),
                self.render_timer(&description, &spec.stop_schedule)?,
            );

            let primary = format!("{}.service", stem);
            let stop_service = self.render_service(
                &BTreeSet::new(),
                &std::iter::once(self.stop_exec_start(&primary)).collect(),
            )?;
            files.insert(
                self.unit_dir.join(format!("{}.service", stop_stem)),
                stop_service,
            );
        }

        debug!(service = %spec.name, files = files.len(), "Synthesized units");
        Ok(files)
    }

    fn stop_exec_start(&self, unit: &str) -> String {
        match self.scope.systemctl_flag() {
            Some(flag) => format!("ExecStart=systemctl {} stop {}", flag, unit),
            None => format!("ExecStart=systemctl stop {}", unit),
        }
    }

    fn render_timer(&self, description: &str, schedules: &[Schedule]) -> UnitResult<String> {
        let timer: Vec<String> = merged_timer_directives(schedules).into_iter().collect();
        let mut context = Context::new();
        context.insert("description", description);
        context.insert("timer", &timer);
        context.insert("wanted_by", TIMER_WANTED_BY);
        self.templates.render(TIMER_TEMPLATE, &context)
    }

    fn render_service(
        &self,
        unit: &BTreeSet<String>,
        service: &BTreeSet<String>,
    ) -> UnitResult<String> {
        let mut context = Context::new();
        context.insert("unit", unit);
        context.insert("service", service);
        context.insert("wanted_by", SERVICE_WANTED_BY);
        self.templates.render(SERVICE_TEMPLATE, &context)
    }
}

/// `[Service]` directives of the primary unit.
pub fn service_directives(spec: &ServiceSpec) -> BTreeSet<String> {
    let mut service = BTreeSet::new();
    service.insert(format!("ExecStart={}", spec.start_command));
    service.insert(format!("KillSignal={}", spec.kill_signal));
    if !spec.start_command_blocking {
        service.insert("RemainAfterExit=yes".to_string());
    }
    if let Some(cmd) = &spec.stop_command {
        service.insert(format!("ExecStop={}", cmd));
    }
    if let Some(cmd) = &spec.restart_command {
        service.insert(format!("ExecReload={}", cmd));
    }
    if let Some(dir) = &spec.working_directory {
        service.insert(format!("WorkingDirectory={}", dir.display()));
    }
    if let Some(timeout) = spec.timeout {
        service.insert(format!("RuntimeMaxSec={}", timeout));
    }
    if let Some(env_file) = &spec.env_file {
        service.insert(format!("EnvironmentFile={}", env_file));
    }
    if !spec.env.is_empty() {
        let assignments = spec
            .env
            .iter()
            .map(|(k, v)| format!("\"{}={}\"", k, quote_env_value(v)))
            .collect::<Vec<_>>()
            .join(" ");
        service.insert(format!("Environment={}", assignments));
    }
    if let Some(policy) = &spec.restart_policy {
        service.extend(policy.directives().service);
    }
    service
}

/// Escape a value for a double-quoted `Environment=` assignment.
///
/// Backslashes go first so the escapes added for quotes stay intact; `%`
/// is doubled so the manager does not expand it as a specifier.
fn quote_env_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('%', "%%")
}

/// `[Unit]` directives of the primary unit.
pub fn unit_directives(spec: &ServiceSpec) -> BTreeSet<String> {
    let mut unit = BTreeSet::new();
    if let Some(description) = &spec.description {
        unit.insert(format!("Description={}", description));
    }
    unit.extend(relation_directives(&spec.relations));
    if let Some(policy) = &spec.restart_policy {
        unit.extend(policy.directives().unit);
    }
    unit.extend(constraint_directives(
        &spec.hardware_constraints,
        &spec.system_load_constraints,
    ));
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;
    use crate::model::{
        Comparison, HardwareConstraint, PressureKind, Relation, RestartCondition, RestartPolicy,
        SystemLoadConstraint,
    };

    fn synthesizer() -> UnitSynthesizer {
        UnitSynthesizer::with_builtin_templates("/units", BusScope::User).unwrap()
    }

    fn content<'a>(files: &'a UnitFiles, name: &str) -> &'a str {
        files
            .get(&PathBuf::from("/units").join(name))
            .map(String::as_str)
            .unwrap_or_else(|| panic!("missing {}", name))
    }

    #[test]
    fn test_environment_quoting() {
        let spec = ServiceSpec::new("x", "run")
            .env("QUOTED", "say \"hi\"")
            .env("TRAILING", "C:\\dir\\")
            .env("PERCENT", "100%h");
        let service = service_directives(&spec);
        let env = service
            .iter()
            .find(|d| d.starts_with("Environment="))
            .unwrap();
        assert_eq!(
            env,
            r#"Environment="PERCENT=100%%h" "QUOTED=say \"hi\"" "TRAILING=C:\\dir\\""#
        );
    }

    #[test]
    fn test_minimal_service() {
        let files = synthesizer().synthesize(&ServiceSpec::new("x", "/bin/true")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            content(&files, "taskflow-x.service"),
            "[Service]\nExecStart=/bin/true\nKillSignal=SIGTERM\n[Install]\nWantedBy=default.target\n"
        );
    }

    #[test]
    fn test_calendar_timer() {
        let spec = ServiceSpec::new("nightly-job", "run")
            .start_schedule(Schedule::calendar("*-*-* 02:00:00"));
        let files = synthesizer().synthesize(&spec).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            content(&files, "taskflow-nightly-job.timer"),
            "[Unit]\nDescription=timer for nightly-job\n[Timer]\nAccuracySec=1ms\nOnCalendar=*-*-* 02:00:00\nPersistent=true\n[Install]\nWantedBy=timers.target\n"
        );
    }

    #[test]
    fn test_stop_schedule_units() {
        let spec = ServiceSpec::new("x", "serve")
            .stop_command("halt")
            .start_schedule(Schedule::calendar("08:00"))
            .stop_schedule(Schedule::calendar("18:00"));
        let files = synthesizer().synthesize(&spec).unwrap();
        assert_eq!(files.len(), 4);

        let stop = content(&files, "stop-taskflow-x.service");
        assert_eq!(
            stop,
            "[Service]\nExecStart=systemctl --user stop taskflow-x.service\n[Install]\nWantedBy=default.target\n"
        );
        assert!(content(&files, "stop-taskflow-x.timer").contains("Description=stop timer for x\n"));
    }

    #[test]
    fn test_system_scope_stop_command() {
        let synth = UnitSynthesizer::with_builtin_templates("/units", BusScope::System).unwrap();
        let spec = ServiceSpec::new("x", "serve").stop_schedule(Schedule::calendar("18:00"));
        let files = synth.synthesize(&spec).unwrap();
        assert!(content(&files, "stop-taskflow-x.service")
            .contains("ExecStart=systemctl stop taskflow-x.service\n"));
    }

    #[test]
    fn test_full_directive_sets() {
        let db = ServiceSpec::new("db", "postgres");
        let spec = ServiceSpec::new("etl", "python etl.py")
            .description("nightly etl")
            .blocking(false)
            .restart_command("kill -HUP 1")
            .timeout(600)
            .env("A", "1")
            .env("B", "two words")
            .env_file("/etc/etl.env")
            .working_directory("/srv/etl")
            .relate(Relation::After, [&db])
            .relate(Relation::Wants, ["network-online.target"])
            .restart_policy(RestartPolicy::Burst {
                condition: RestartCondition::OnFailure,
                restart_limit: 5,
                window_secs: 10,
            })
            .hardware_constraint(HardwareConstraint::Cpus {
                count: 2,
                comparison: Comparison::GreaterOrEqual,
                silent: true,
            })
            .load_constraint(SystemLoadConstraint::new(PressureKind::Memory, 50));

        let unit = unit_directives(&spec);
        let expected_unit: BTreeSet<String> = [
            "AssertMemoryPressure=50%/5min",
            "After=taskflow-db.service",
            "ConditionCPUs=>=2",
            "Description=nightly etl",
            "StartLimitBurst=5",
            "StartLimitIntervalSec=10",
            "Wants=network-online.target",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(unit, expected_unit);

        let service = service_directives(&spec);
        assert!(service.contains("RemainAfterExit=yes"));
        assert!(service.contains("ExecReload=kill -HUP 1"));
        assert!(service.contains("RuntimeMaxSec=600"));
        assert!(service.contains("EnvironmentFile=/etc/etl.env"));
        assert!(service.contains("Environment=\"A=1\" \"B=two words\""));
        assert!(service.contains("WorkingDirectory=/srv/etl"));
        assert!(service.contains("Restart=on-failure"));
        assert!(!service.iter().any(|d| d.starts_with("StartLimit")));
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let spec = ServiceSpec::new("x", "run")
            .env("Z", "1")
            .env("A", "2")
            .relate(Relation::Before, ["a.service", "b.service"])
            .start_schedule(Schedule::calendar("hourly"))
            .start_schedule(Schedule::calendar("daily"));
        let synth = synthesizer();
        assert_eq!(synth.synthesize(&spec).unwrap(), synth.synthesize(&spec).unwrap());
    }

    #[test]
    fn test_invalid_spec_fails_before_output() {
        let err = synthesizer().synthesize(&ServiceSpec::new("", "run")).unwrap_err();
        assert!(matches!(err, UnitError::Validation { .. }));
    }
}
