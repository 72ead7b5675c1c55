//! Run history backends.
//!
//! The JSON-lines backend appends one record per line and replays the
//! file on read, the last line for a key winning.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{HistoryErrorKind, UnitError, UnitResult};

use super::record::{HistoryRecord, RecordKey};

/// Persists run history.
pub trait RunLogger: Send + Sync {
    /// Insert `record`, replacing any record with the same key.
    fn upsert(&self, record: &HistoryRecord) -> UnitResult<()>;

    /// Current records, ordered by key.
    fn records(&self) -> UnitResult<Vec<HistoryRecord>>;
}

fn poisoned<T>(_: T) -> UnitError {
    UnitError::History {
        kind: HistoryErrorKind::LockPoisoned,
    }
}

/// Run history kept in process memory.
#[derive(Default)]
pub struct MemoryRunLogger {
    records: Mutex<BTreeMap<RecordKey, HistoryRecord>>,
}

impl MemoryRunLogger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunLogger for MemoryRunLogger {
    fn upsert(&self, record: &HistoryRecord) -> UnitResult<()> {
        self.records
            .lock()
            .map_err(poisoned)?
            .insert(record.key(), record.clone());
        Ok(())
    }

    fn records(&self) -> UnitResult<Vec<HistoryRecord>> {
        Ok(self.records.lock().map_err(poisoned)?.values().cloned().collect())
    }
}

/// Run history appended to a JSON-lines file.
pub struct JsonlRunLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonlRunLogger {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn new(path: &Path) -> UnitResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating history directory");
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "History log opened");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> UnitResult<MutexGuard<'_, File>> {
        self.file.lock().map_err(poisoned)
    }
}

impl RunLogger for JsonlRunLogger {
    fn upsert(&self, record: &HistoryRecord) -> UnitResult<()> {
        let json = serde_json::to_string(record)?;

        let mut file = self.lock()?;
        writeln!(file, "{}", json)?;
        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync history log");
        }

        let key = record.key();
        debug!(kind = key.kind, name = %key.name, "History record written");
        Ok(())
    }

    fn records(&self) -> UnitResult<Vec<HistoryRecord>> {
        // Hold the lock so no line is half-written while we read.
        let _guard = self.lock()?;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut latest = BTreeMap::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => {
                    latest.insert(record.key(), record);
                }
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable history line"
                ),
            }
        }
        Ok(latest.into_values().collect())
    }
}

/// Run logger that discards everything.
#[derive(Debug, Default)]
pub struct NullRunLogger;

impl RunLogger for NullRunLogger {
    fn upsert(&self, _record: &HistoryRecord) -> UnitResult<()> {
        Ok(())
    }

    fn records(&self) -> UnitResult<Vec<HistoryRecord>> {
        Ok(Vec::new())
    }
}

/// Dialect part of a history store URL (`memory`, `jsonl`, ...).
pub fn url_dialect(url: &str) -> UnitResult<&str> {
    url.split_once("://")
        .map(|(dialect, _)| dialect)
        .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
        .ok_or_else(|| UnitError::History {
            kind: HistoryErrorKind::InvalidUrl {
                url: url.to_string(),
            },
        })
}

/// Open the run logger a store URL names.
///
/// `memory://` keeps history in process; `jsonl://<path>` appends to a
/// file. Any other dialect is rejected.
pub fn open_run_logger(url: &str) -> UnitResult<Box<dyn RunLogger>> {
    let dialect = url_dialect(url)?;
    let location = &url[dialect.len() + 3..];
    match dialect {
        "memory" => {
            info!("Using in-memory run history");
            Ok(Box::new(MemoryRunLogger::new()))
        }
        "jsonl" if !location.is_empty() => {
            info!(path = %location, "Using JSON-lines run history");
            Ok(Box::new(JsonlRunLogger::new(Path::new(location))?))
        }
        "jsonl" => Err(UnitError::History {
            kind: HistoryErrorKind::InvalidUrl {
                url: url.to_string(),
            },
        }),
        other => Err(UnitError::History {
            kind: HistoryErrorKind::UnsupportedDialect {
                dialect: other.to_string(),
            },
        }),
    }
}
