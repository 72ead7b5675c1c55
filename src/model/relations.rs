//! Dependency relations between units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::UnitResult;
use crate::validation::{validate_spec_name, validate_unit_name};

use super::service::{unit_stem, ServiceSpec};

/// Kind of link between this service and other units.
///
/// Variant order is the order directives are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Start before the listed units.
    Before,
    /// Start after the listed units.
    After,
    /// Start the listed units alongside; their failure is ignored.
    Wants,
    /// Like `Wants`, but keep restarting them while this unit is up.
    Upholds,
    /// Start alongside; stop or restart with them when explicitly stopped.
    Requires,
    /// Fail immediately unless the listed units are already active.
    Requisite,
    /// Like `Requires`, but also stop when they stop for any reason.
    BindsTo,
    /// Starting one stops the other.
    Conflicts,
    /// Activated when this unit enters the inactive state.
    OnSuccess,
    /// Activated when this unit enters the failed state.
    OnFailure,
    /// Stop/restart of the listed units propagates to this one.
    PartOf,
    PropagatesStopTo,
    StopPropagatedFrom,
}

impl Relation {
    pub const ALL: [Relation; 13] = [
        Relation::Before,
        Relation::After,
        Relation::Wants,
        Relation::Upholds,
        Relation::Requires,
        Relation::Requisite,
        Relation::BindsTo,
        Relation::Conflicts,
        Relation::OnSuccess,
        Relation::OnFailure,
        Relation::PartOf,
        Relation::PropagatesStopTo,
        Relation::StopPropagatedFrom,
    ];

    /// `[Unit]` directive key for this relation.
    pub fn directive_key(self) -> &'static str {
        match self {
            Relation::Before => "Before",
            Relation::After => "After",
            Relation::Wants => "Wants",
            Relation::Upholds => "Upholds",
            Relation::Requires => "Requires",
            Relation::Requisite => "Requisite",
            Relation::BindsTo => "BindsTo",
            Relation::Conflicts => "Conflicts",
            Relation::OnSuccess => "OnSuccess",
            Relation::OnFailure => "OnFailure",
            Relation::PartOf => "PartOf",
            Relation::PropagatesStopTo => "PropagatesStopTo",
            Relation::StopPropagatedFrom => "StopPropagatedFrom",
        }
    }
}

/// Target of a relation: either an external unit or another managed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitRef {
    /// Raw unit name passed through as written (e.g. `network-online.target`).
    Unit(String),
    /// A service managed by this crate, referenced by spec name.
    Service { service: String },
}

impl UnitRef {
    /// Manager-addressable unit name.
    pub fn resolve(&self) -> String {
        match self {
            UnitRef::Unit(name) => name.clone(),
            UnitRef::Service { service } => format!("{}.service", unit_stem(service)),
        }
    }

    pub fn validate(&self) -> UnitResult<()> {
        match self {
            UnitRef::Unit(name) => validate_unit_name(name),
            UnitRef::Service { service } => validate_spec_name(service),
        }
    }
}

impl From<&str> for UnitRef {
    fn from(name: &str) -> Self {
        UnitRef::Unit(name.to_string())
    }
}

impl From<String> for UnitRef {
    fn from(name: String) -> Self {
        UnitRef::Unit(name)
    }
}

impl From<&ServiceSpec> for UnitRef {
    fn from(spec: &ServiceSpec) -> Self {
        UnitRef::Service {
            service: spec.name.clone(),
        }
    }
}

/// All relations of a service, keyed by kind.
pub type Relations = BTreeMap<Relation, Vec<UnitRef>>;

/// Resolve every non-empty relation into a `Key=unit unit ...` directive.
pub fn relation_directives(relations: &Relations) -> Vec<String> {
    relations
        .iter()
        .filter(|(_, targets)| !targets.is_empty())
        .map(|(relation, targets)| {
            let joined = targets
                .iter()
                .map(UnitRef::resolve)
                .collect::<Vec<_>>()
                .join(" ");
            format!("{}={}", relation.directive_key(), joined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_raw_unit() {
        assert_eq!(UnitRef::from("network.target").resolve(), "network.target");
    }

    #[test]
    fn test_resolve_managed_service() {
        let r = UnitRef::Service {
            service: "db backup".to_string(),
        };
        assert_eq!(r.resolve(), "taskflow-db_backup.service");
    }

    #[test]
    fn test_every_relation_has_distinct_key() {
        let keys: std::collections::BTreeSet<_> =
            Relation::ALL.iter().map(|r| r.directive_key()).collect();
        assert_eq!(keys.len(), 13);
    }

    #[test]
    fn test_relation_directives_skip_empty() {
        let mut relations = Relations::new();
        relations.insert(Relation::After, vec!["a.service".into(), "b.target".into()]);
        relations.insert(Relation::Conflicts, vec![]);
        let directives = relation_directives(&relations);
        assert_eq!(directives, vec!["After=a.service b.target".to_string()]);
    }

    #[test]
    fn test_unit_ref_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            targets: Vec<UnitRef>,
        }
        let holder: Holder =
            toml::from_str(r#"targets = ["network.target", { service = "etl" }]"#).unwrap();
        assert_eq!(holder.targets[0], UnitRef::Unit("network.target".to_string()));
        assert_eq!(holder.targets[1].resolve(), "taskflow-etl.service");
    }
}
