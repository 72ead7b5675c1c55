//! Unit lifecycle orchestration.
//!
//! Each operation is a thin sequence of manager calls over synthesized
//! unit files. Multi-unit operations are not transactional: stop, disable
//! and clean failures are logged per unit and the remaining units are
//! still attempted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::container::{referenced_containers, ContainerLifecycleProvider, ContainerService};
use crate::error::{ContainerErrorKind, UnitError, UnitResult};
use crate::history::{HistoryRecord, RunLogger};
use crate::ipc::{JobMode, UnitFileChange, UnitManager};
use crate::model::{ArtifactSet, ServiceSpec, STOP_UNIT_PREFIX};
use crate::synth::{UnitFiles, UnitStore, UnitSynthesizer};

use super::report::{RemovalReport, UnitAction, UnitFailure};

/// Everything `CleanUnit` can remove.
const CLEAN_ALL: &[&str] = &["all"];

/// File name of a unit path, as the manager addresses it.
pub fn unit_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Whether `unit` is the derived service that stops another service.
pub fn is_stop_service(unit: &str) -> bool {
    unit.starts_with(STOP_UNIT_PREFIX) && unit.ends_with(".service")
}

/// Creates, drives and removes the units of service specs.
pub struct LifecycleManager<'a> {
    manager: &'a dyn UnitManager,
    synthesizer: UnitSynthesizer,
    store: UnitStore,
    containers: Option<&'a dyn ContainerLifecycleProvider>,
    history: Option<&'a dyn RunLogger>,
}

impl<'a> LifecycleManager<'a> {
    /// Manager writing to the synthesizer's unit directory.
    pub fn new(manager: &'a dyn UnitManager, synthesizer: UnitSynthesizer) -> Self {
        let store = UnitStore::new(synthesizer.unit_dir());
        Self {
            manager,
            synthesizer,
            store,
            containers: None,
            history: None,
        }
    }

    pub fn with_containers(mut self, provider: &'a dyn ContainerLifecycleProvider) -> Self {
        self.containers = Some(provider);
        self
    }

    pub fn with_history(mut self, history: &'a dyn RunLogger) -> Self {
        self.history = Some(history);
        self
    }

    pub fn synthesizer(&self) -> &UnitSynthesizer {
        &self.synthesizer
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    /// Write, register and enable the units of `spec`.
    ///
    /// Units left from an earlier version of the spec are removed first, so
    /// calling `create` again after a partial failure is safe. With
    /// `defer_reload` the caller must call [`reload`](Self::reload) before
    /// the new units are visible to the manager.
    pub fn create(&self, spec: &ServiceSpec, defer_reload: bool) -> UnitResult<ArtifactSet> {
        let files = self.synthesizer.synthesize(spec)?;
        self.replace_previous(spec)?;
        self.install(spec, &files, defer_reload)
    }

    /// Create the container a container service needs, then its units.
    ///
    /// Units left from an earlier deployment are removed before the
    /// container is created, so a container they reference is deleted
    /// first and the new one is the one left running.
    pub fn create_container_service(
        &self,
        service: &ContainerService,
        defer_reload: bool,
    ) -> UnitResult<ArtifactSet> {
        let files = self.synthesizer.synthesize(&service.service)?;
        let provider = match service.container_to_create() {
            Some(container) => Some((
                container,
                self.containers.ok_or_else(|| UnitError::Container {
                    kind: ContainerErrorKind::NoProvider {
                        name: container.name.clone().unwrap_or_default(),
                    },
                })?,
            )),
            None => None,
        };

        self.replace_previous(&service.service)?;
        if let Some((container, provider)) = provider {
            provider.create(container)?;
        }
        self.install(&service.service, &files, defer_reload)
    }

    /// Remove whatever an earlier version of `spec` left behind.
    fn replace_previous(&self, spec: &ServiceSpec) -> UnitResult<()> {
        let prior = spec.possible_artifacts(self.synthesizer.unit_dir()).existing();
        if prior.is_empty() {
            return Ok(());
        }
        info!(service = %spec.name, files = prior.all_files().len(), "Removing previous units");
        let report = self.remove(&prior.service_files, &prior.timer_files)?;
        for failure in &report.failures {
            debug!(service = %spec.name, failure = %failure, "Ignored while replacing units");
        }
        Ok(())
    }

    /// Write, reload and enable synthesized units, then record the service.
    fn install(
        &self,
        spec: &ServiceSpec,
        files: &UnitFiles,
        defer_reload: bool,
    ) -> UnitResult<ArtifactSet> {
        self.store.write_all(files)?;

        if !defer_reload {
            self.reload()?;
        }

        let artifacts = spec.artifacts(self.synthesizer.unit_dir());
        self.enable(&artifacts.all_files())?;

        if let Some(history) = self.history {
            history.upsert(&HistoryRecord::service(spec)?)?;
        }

        info!(service = %spec.name, files = files.len(), "Service created");
        Ok(artifacts)
    }

    /// Start every unit in `files`, skipping derived stop services.
    pub fn start(&self, files: &[PathBuf]) -> UnitResult<()> {
        for file in files {
            let unit = unit_name(file);
            if is_stop_service(&unit) {
                debug!(unit = %unit, "Not starting stop service");
                continue;
            }
            info!(unit = %unit, "Starting");
            self.manager.start_unit(&unit, JobMode::Replace)?;
        }
        Ok(())
    }

    /// Stop every unit in `files`. Failures are logged and returned.
    pub fn stop(&self, files: &[PathBuf]) -> Vec<UnitFailure> {
        let mut failures = Vec::new();
        for file in files {
            let unit = unit_name(file);
            info!(unit = %unit, "Stopping");
            if let Err(e) = self.manager.stop_unit(&unit, JobMode::Replace) {
                warn!(unit = %unit, error = %e, "Could not stop unit");
                failures.push(UnitFailure::new(unit, UnitAction::Stop, e));
            }
        }
        failures
    }

    pub fn restart(&self, files: &[PathBuf]) -> UnitResult<()> {
        for file in files {
            let unit = unit_name(file);
            info!(unit = %unit, "Restarting");
            self.manager.restart_unit(&unit, JobMode::Replace)?;
        }
        Ok(())
    }

    /// Enable `files` persistently, replacing conflicting symlinks.
    pub fn enable(&self, files: &[PathBuf]) -> UnitResult<Vec<UnitFileChange>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let paths: Vec<String> = files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect();
        info!(files = ?paths, "Enabling");
        let changes = self.manager.enable_unit_files(&paths, false, true)?;
        for change in &changes {
            debug!(change = %change.change_type, file = %change.file, destination = %change.destination, "Unit file change");
        }
        Ok(changes)
    }

    /// Disable `files`. If the batch call fails each unit is retried on its
    /// own; units that still fail are logged and returned.
    pub fn disable(&self, files: &[PathBuf]) -> Vec<UnitFailure> {
        if files.is_empty() {
            return Vec::new();
        }
        let units: Vec<String> = files.iter().map(|f| unit_name(f)).collect();
        info!(units = ?units, "Disabling");

        match self.manager.disable_unit_files(&units, false) {
            Ok(changes) => {
                log_changes(&changes);
                Vec::new()
            }
            Err(e) => {
                debug!(error = %e, "Batch disable failed, retrying per unit");
                let mut failures = Vec::new();
                for unit in units {
                    match self.manager.disable_unit_files(std::slice::from_ref(&unit), false) {
                        Ok(changes) => log_changes(&changes),
                        Err(e) => {
                            warn!(unit = %unit, error = %e, "Could not disable unit");
                            failures.push(UnitFailure::new(unit, UnitAction::Disable, e));
                        }
                    }
                }
                failures
            }
        }
    }

    /// Tear down and delete units.
    ///
    /// Order: stop, disable, clean each service, delete every container the
    /// services reference (once per name), delete the files. Nothing waits
    /// for the manager to report a unit as stopped before its file is
    /// deleted.
    pub fn remove(
        &self,
        service_files: &[PathBuf],
        timer_files: &[PathBuf],
    ) -> UnitResult<RemovalReport> {
        let files: Vec<PathBuf> = service_files
            .iter()
            .chain(timer_files.iter())
            .cloned()
            .collect();
        let mut report = RemovalReport::default();

        report.failures.extend(self.stop(&files));
        report.failures.extend(self.disable(&files));

        let mut containers = BTreeSet::new();
        for file in service_files {
            let unit = unit_name(file);
            info!(unit = %unit, "Cleaning cache and runtime directories");
            if let Err(e) = self.manager.clean_unit(&unit, CLEAN_ALL) {
                warn!(unit = %unit, error = %e, "Could not clean unit");
                report
                    .failures
                    .push(UnitFailure::new(unit.clone(), UnitAction::Clean, e));
            }
            match self.store.read(file) {
                Ok(text) => containers.extend(referenced_containers(&text)),
                Err(e) => warn!(path = %file.display(), error = %e, "Could not read unit"),
            }
        }

        for name in containers {
            let Some(provider) = self.containers else {
                warn!(container = %name, "No container provider, container left in place");
                report.failures.push(UnitFailure::new(
                    name,
                    UnitAction::DeleteContainer,
                    "no container provider configured",
                ));
                continue;
            };
            match provider.delete(&name) {
                Ok(()) => report.deleted_containers.push(name),
                Err(e) => {
                    warn!(container = %name, error = %e, "Could not delete container");
                    report
                        .failures
                        .push(UnitFailure::new(name, UnitAction::DeleteContainer, e));
                }
            }
        }

        for file in &files {
            if self.store.delete(file)? {
                report.deleted_files.push(file.clone());
            }
        }

        info!(
            files = report.deleted_files.len(),
            containers = report.deleted_containers.len(),
            failures = report.failures.len(),
            "Units removed"
        );
        Ok(report)
    }

    /// Remove whatever units a service called `name` left in the store.
    pub fn remove_service(&self, name: &str) -> UnitResult<RemovalReport> {
        let existing = ArtifactSet::possible(self.synthesizer.unit_dir(), name).existing();
        self.remove(&existing.service_files, &existing.timer_files)
    }

    /// Make newly written unit files visible to the manager.
    pub fn reload(&self) -> UnitResult<()> {
        debug!("Reloading manager");
        self.manager.reload()
    }
}

fn log_changes(changes: &[UnitFileChange]) {
    for change in changes {
        info!(change = %change.change_type, file = %change.file, destination = %change.destination, "Unit file change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    use crate::ipc::{BusScope, InMemoryManager, ManagerCall};
    use crate::model::Schedule;

    fn setup(tmp: &TempDir) -> UnitSynthesizer {
        UnitSynthesizer::with_builtin_templates(tmp.path(), BusScope::User).unwrap()
    }

    #[test]
    fn test_stop_service_detection() {
        assert!(is_stop_service("stop-taskflow-x.service"));
        assert!(!is_stop_service("stop-taskflow-x.timer"));
        assert!(!is_stop_service("taskflow-stop-x.service"));
    }

    #[test]
    fn test_start_skips_stop_service() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        bus.add_unit_file("x.service");
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        lifecycle
            .start(&[PathBuf::from("x.service"), PathBuf::from("stop-x.service")])
            .unwrap();

        assert_eq!(bus.calls(), vec![ManagerCall::Start("x.service".into())]);
    }

    #[test]
    fn test_start_propagates_failure() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));
        assert!(lifecycle.start(&[PathBuf::from("missing.service")]).is_err());
    }

    #[test]
    fn test_stop_continues_after_failure() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        bus.fail_on("StopUnit", "a.service");
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        let failures = lifecycle.stop(&[
            PathBuf::from("/u/a.service"),
            PathBuf::from("/u/b.service"),
        ]);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].unit, "a.service");
        assert_eq!(failures[0].action, UnitAction::Stop);
        assert_eq!(
            bus.calls(),
            vec![
                ManagerCall::Stop("a.service".into()),
                ManagerCall::Stop("b.service".into())
            ]
        );
    }

    #[test]
    fn test_disable_falls_back_per_unit() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        bus.fail_on("DisableUnitFiles", "a.timer");
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        let failures =
            lifecycle.disable(&[PathBuf::from("/u/a.timer"), PathBuf::from("/u/b.timer")]);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].unit, "a.timer");
        assert_eq!(bus.calls().len(), 3);
    }

    #[test]
    fn test_enable_is_persistent_with_full_paths() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        lifecycle.enable(&[PathBuf::from("/u/a.service")]).unwrap();
        assert_eq!(
            bus.calls(),
            vec![ManagerCall::Enable(vec!["/u/a.service".into()])]
        );
        assert!(lifecycle.enable(&[]).unwrap().is_empty());
        assert_eq!(bus.calls().len(), 1);
    }

    #[test]
    fn test_create_replaces_previous_shape() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        let first = ServiceSpec::new("x", "run")
            .start_schedule(Schedule::calendar("daily"))
            .stop_schedule(Schedule::calendar("hourly"));
        lifecycle.create(&first, false).unwrap();
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 4);

        let second = ServiceSpec::new("x", "run");
        let artifacts = lifecycle.create(&second, false).unwrap();
        assert_eq!(artifacts.all_files().len(), 1);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
        assert_eq!(bus.enabled_units(), vec!["taskflow-x.service"]);
    }

    #[test]
    fn test_create_defer_reload() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        lifecycle.create(&ServiceSpec::new("x", "run"), true).unwrap();
        assert!(!bus.calls().contains(&ManagerCall::Reload));
    }

    #[test]
    fn test_create_rejects_invalid_spec_before_io() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));

        assert!(lifecycle.create(&ServiceSpec::new("", "run"), false).is_err());
        assert!(bus.calls().is_empty());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_remove_tolerates_clean_failure() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));
        let artifacts = lifecycle.create(&ServiceSpec::new("x", "run"), false).unwrap();
        bus.fail_on("CleanUnit", "");

        let report = lifecycle
            .remove(&artifacts.service_files, &artifacts.timer_files)
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, UnitAction::Clean);
        assert_eq!(report.deleted_files, artifacts.service_files);
    }

    #[test]
    fn test_remove_service_by_name() {
        let tmp = TempDir::new().unwrap();
        let bus = InMemoryManager::new();
        let lifecycle = LifecycleManager::new(&bus, setup(&tmp));
        let spec = ServiceSpec::new("report job", "run").start_schedule(Schedule::calendar("daily"));
        lifecycle.create(&spec, false).unwrap();

        let report = lifecycle.remove_service("report job").unwrap();
        assert_eq!(report.deleted_files.len(), 2);
        assert!(report.is_clean());
    }
}
