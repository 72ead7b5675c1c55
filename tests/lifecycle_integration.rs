//! Integration tests for unit synthesis and lifecycle.
//!
//! These drive the full create / start / query / remove flow against an
//! in-memory service manager and a temporary unit directory.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Mutex;

use tempfile::TempDir;

use taskflow_units::container::{
    ContainerBacking, ContainerLifecycleProvider, ContainerService, ContainerSpec,
};
use taskflow_units::error::{UnitError, UnitResult};
use taskflow_units::history::{HistoryRecord, MemoryRunLogger, RunLogger};
use taskflow_units::ipc::{
    BusScope, CalendarTimer, InMemoryManager, ManagerCall, ServiceTimestamps, TimerProperties,
};
use taskflow_units::lifecycle::LifecycleManager;
use taskflow_units::model::{Relation, RestartCondition, RestartPolicy, Schedule, ServiceSpec};
use taskflow_units::query::UnitQuery;
use taskflow_units::synth::UnitSynthesizer;

/// Container provider that records what it was asked to do.
#[derive(Default)]
struct RecordingProvider {
    events: Mutex<Vec<String>>,
    live: Mutex<BTreeSet<String>>,
}

impl RecordingProvider {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn is_live(&self, name: &str) -> bool {
        self.live.lock().unwrap().contains(name)
    }
}

impl ContainerLifecycleProvider for RecordingProvider {
    fn create(&self, spec: &ContainerSpec) -> UnitResult<()> {
        let name = spec.name.clone().unwrap_or_default();
        self.events.lock().unwrap().push(format!("create {}", name));
        self.live.lock().unwrap().insert(name);
        Ok(())
    }

    fn delete(&self, name: &str) -> UnitResult<()> {
        self.events.lock().unwrap().push(format!("delete {}", name));
        self.live.lock().unwrap().remove(name);
        Ok(())
    }
}

fn synthesizer(dir: &TempDir) -> UnitSynthesizer {
    UnitSynthesizer::with_builtin_templates(dir.path(), BusScope::User)
        .expect("built-in templates compile")
}

fn files_in(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_create_then_remove_nightly_job() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let spec = ServiceSpec::new("nightly-job", "python etl.py")
        .start_schedule(Schedule::calendar("*-*-* 02:00:00"));
    let artifacts = lifecycle.create(&spec, false).unwrap();

    assert_eq!(artifacts.service_files.len(), 1);
    assert_eq!(artifacts.timer_files.len(), 1);
    assert_eq!(
        files_in(&dir),
        vec!["taskflow-nightly-job.service", "taskflow-nightly-job.timer"]
    );
    assert_eq!(
        bus.enabled_units(),
        vec!["taskflow-nightly-job.service", "taskflow-nightly-job.timer"]
    );
    assert!(bus.calls().contains(&ManagerCall::Reload));

    let report = lifecycle.remove_service("nightly-job").unwrap();
    assert!(report.is_clean());
    assert_eq!(report.deleted_files.len(), 2);
    assert!(files_in(&dir).is_empty());
    assert!(bus.enabled_units().is_empty());
}

#[test]
fn test_stop_schedule_file_count() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let spec = ServiceSpec::new("office-hours", "serve")
        .start_schedule(Schedule::calendar("Mon..Fri 08:00"))
        .stop_schedule(Schedule::calendar("Mon..Fri 18:00"));
    lifecycle.create(&spec, false).unwrap();

    assert_eq!(
        files_in(&dir),
        vec![
            "stop-taskflow-office-hours.service",
            "stop-taskflow-office-hours.timer",
            "taskflow-office-hours.service",
            "taskflow-office-hours.timer",
        ]
    );

    let stop_service = fs::read_to_string(dir.path().join("stop-taskflow-office-hours.service"))
        .unwrap();
    assert!(stop_service
        .contains("ExecStart=systemctl --user stop taskflow-office-hours.service\n"));
}

#[test]
fn test_start_skips_stop_services() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let spec = ServiceSpec::new("x", "run")
        .stop_schedule(Schedule::calendar("18:00"));
    let artifacts = lifecycle.create(&spec, false).unwrap();
    lifecycle.start(&artifacts.service_files).unwrap();

    assert!(bus.is_active("taskflow-x.service"));
    assert!(!bus.is_active("stop-taskflow-x.service"));
}

#[test]
fn test_redefinition_replaces_previous_shape() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let with_stop = ServiceSpec::new("x", "run")
        .start_schedule(Schedule::calendar("08:00"))
        .stop_schedule(Schedule::calendar("18:00"));
    lifecycle.create(&with_stop, false).unwrap();
    assert_eq!(files_in(&dir).len(), 4);

    let plain = ServiceSpec::new("x", "run");
    lifecycle.create(&plain, false).unwrap();
    assert_eq!(files_in(&dir), vec!["taskflow-x.service"]);
}

#[test]
fn test_create_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));
    let spec = ServiceSpec::new("x", "run").start_schedule(Schedule::calendar("hourly"));

    lifecycle.create(&spec, false).unwrap();
    let first = fs::read_to_string(dir.path().join("taskflow-x.timer")).unwrap();
    lifecycle.create(&spec, false).unwrap();
    let second = fs::read_to_string(dir.path().join("taskflow-x.timer")).unwrap();

    assert_eq!(first, second);
    assert_eq!(files_in(&dir).len(), 2);
}

#[test]
fn test_burst_restart_policy_lands_in_unit_section() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let spec = ServiceSpec::new("x", "run").restart_policy(RestartPolicy::Burst {
        condition: RestartCondition::OnFailure,
        restart_limit: 5,
        window_secs: 10,
    });
    lifecycle.create(&spec, false).unwrap();

    let text = fs::read_to_string(dir.path().join("taskflow-x.service")).unwrap();
    let (unit, service) = text.split_once("[Service]\n").unwrap();
    assert!(unit.contains("StartLimitBurst=5\n"));
    assert!(unit.contains("StartLimitIntervalSec=10\n"));
    assert!(service.contains("Restart=on-failure\n"));
}

#[test]
fn test_container_deleted_once() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let provider = RecordingProvider::default();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir)).with_containers(&provider);

    let service = ContainerService::start_existing(
        ContainerBacking::Managed(ContainerSpec::new("redis:7").name("c1")),
        "cache",
    )
    .unwrap();
    lifecycle.create_container_service(&service, false).unwrap();
    assert_eq!(provider.events(), vec!["create c1"]);

    let report = lifecycle.remove_service("cache").unwrap();
    assert!(report.is_clean());
    assert_eq!(report.deleted_containers, vec!["c1"]);
    assert_eq!(provider.events(), vec!["create c1", "delete c1"]);
}

#[test]
fn test_redeploying_container_service_keeps_new_container() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let provider = RecordingProvider::default();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir)).with_containers(&provider);

    let service = ContainerService::start_existing(
        ContainerBacking::Managed(ContainerSpec::new("redis:7").name("c1")),
        "cache",
    )
    .unwrap();
    lifecycle.create_container_service(&service, false).unwrap();
    lifecycle.create_container_service(&service, false).unwrap();

    assert_eq!(provider.events(), vec!["create c1", "delete c1", "create c1"]);
    assert!(provider.is_live("c1"));
    assert!(bus.is_enabled("taskflow-cache.service"));
    let text = fs::read_to_string(dir.path().join("taskflow-cache.service")).unwrap();
    assert!(text.contains("ExecStart=docker start c1\n"));
}

#[test]
fn test_invalid_container_service_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let provider = RecordingProvider::default();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir)).with_containers(&provider);

    let mut service = ContainerService::start_existing(
        ContainerBacking::Managed(ContainerSpec::new("redis:7").name("c1")),
        "cache",
    )
    .unwrap();
    service.service.description = Some("cache\n[Install]".to_string());

    let err = lifecycle.create_container_service(&service, false).unwrap_err();
    assert!(matches!(err, UnitError::Validation { .. }));
    assert!(provider.events().is_empty());
    assert!(files_in(&dir).is_empty());
}

#[test]
fn test_injected_lines_rejected_before_any_write() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    let bad_command = ServiceSpec::new("x", "run\nExecStartPre=/bin/evil");
    let bad_env = ServiceSpec::new("y", "run").env("A", "\n[Install]");
    for spec in [bad_command, bad_env] {
        let err = lifecycle.create(&spec, false).unwrap_err();
        assert!(matches!(err, UnitError::Validation { .. }));
    }

    assert!(files_in(&dir).is_empty());
    assert!(bus.calls().is_empty());
}

#[test]
fn test_invalid_redefinition_keeps_previous_units() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir));

    lifecycle.create(&ServiceSpec::new("x", "run"), false).unwrap();
    let broken = ServiceSpec::new("x", "run").relate(Relation::After, ["db\nUser=root"]);
    assert!(lifecycle.create(&broken, false).is_err());

    assert_eq!(files_in(&dir), vec!["taskflow-x.service"]);
    assert!(bus.is_enabled("taskflow-x.service"));
}

#[test]
fn test_history_upserted_on_create() {
    let dir = TempDir::new().unwrap();
    let bus = InMemoryManager::new();
    let history = MemoryRunLogger::new();
    let lifecycle = LifecycleManager::new(&bus, synthesizer(&dir)).with_history(&history);

    let spec = ServiceSpec::new("x", "run");
    lifecycle.create(&spec, false).unwrap();
    lifecycle.create(&spec.clone().description("second"), false).unwrap();

    let records = history.records().unwrap();
    assert_eq!(records.len(), 1);
    assert!(matches!(&records[0], HistoryRecord::Service { name, .. } if name == "x"));
}

#[test]
fn test_schedule_info_sentinels() {
    let bus = InMemoryManager::new();
    bus.set_timestamps(
        "taskflow-x.service",
        ServiceTimestamps {
            active_enter_usec: 1_700_000_000_000_000,
            active_exit_usec: 0,
        },
    );
    bus.set_timer(
        "taskflow-x.timer",
        TimerProperties {
            next_elapse_realtime_usec: 0,
            calendar: vec![
                CalendarTimer {
                    base: "OnCalendar".to_string(),
                    spec: "*-*-* 02:00:00".to_string(),
                    next_elapse_usec: 1_700_000_900_000_000,
                },
                CalendarTimer {
                    base: "OnCalendar".to_string(),
                    spec: "*-*-* 01:00:00".to_string(),
                    next_elapse_usec: 1_700_000_500_000_000,
                },
            ],
            monotonic: Vec::new(),
        },
    );

    let info = UnitQuery::new(&bus).get_schedule_info("x.service").unwrap();

    assert_eq!(
        info.last_start.map(|t| t.timestamp()),
        Some(1_700_000_000)
    );
    assert!(info.last_finish.is_none());
    assert_eq!(info.next_start.map(|t| t.timestamp()), Some(1_700_000_500));
    assert_eq!(info.timers_calendar.len(), 2);
}

#[test]
fn test_escape_path() {
    let bus = InMemoryManager::new();
    let query = UnitQuery::new(&bus);
    assert_eq!(query.escape_path("/var/lib/taskflow").unwrap(), "var-lib-taskflow");
}
