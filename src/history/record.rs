//! Run history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnitResult;
use crate::model::ServiceSpec;

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum HistoryRecord {
    /// A registered service and the configuration it was created with.
    Service {
        name: String,
        command: String,
        schedule: serde_json::Value,
        config: serde_json::Value,
    },
    /// One activation of a service.
    ServiceRun {
        service_name: String,
        started: DateTime<Utc>,
        #[serde(default)]
        finished: Option<DateTime<Utc>>,
        #[serde(default)]
        success: Option<bool>,
    },
    /// One run of a task inside a service.
    TaskRun {
        task_name: String,
        started: DateTime<Utc>,
        #[serde(default)]
        finished: Option<DateTime<Utc>>,
        #[serde(default)]
        retries: u32,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        return_value: Option<String>,
    },
    /// An error raised by a task.
    TaskError {
        task_name: String,
        time: DateTime<Utc>,
        #[serde(rename = "type")]
        error_type: String,
        message: String,
    },
}

/// Identity of a record; upserting a record with an existing key
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub kind: &'static str,
    pub name: String,
    pub at: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    /// `Service` record describing `spec`.
    pub fn service(spec: &ServiceSpec) -> UnitResult<Self> {
        Ok(HistoryRecord::Service {
            name: spec.name.clone(),
            command: spec.start_command.clone(),
            schedule: serde_json::to_value(&spec.start_schedule)?,
            config: serde_json::to_value(spec)?,
        })
    }

    pub fn key(&self) -> RecordKey {
        match self {
            HistoryRecord::Service { name, .. } => RecordKey {
                kind: "service",
                name: name.clone(),
                at: None,
            },
            HistoryRecord::ServiceRun {
                service_name,
                started,
                ..
            } => RecordKey {
                kind: "service_run",
                name: service_name.clone(),
                at: Some(*started),
            },
            HistoryRecord::TaskRun {
                task_name, started, ..
            } => RecordKey {
                kind: "task_run",
                name: task_name.clone(),
                at: Some(*started),
            },
            HistoryRecord::TaskError {
                task_name, time, ..
            } => RecordKey {
                kind: "task_error",
                name: task_name.clone(),
                at: Some(*time),
            },
        }
    }
}
