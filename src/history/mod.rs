//! Run history.
//!
//! The lifecycle layer only ever upserts into a [`RunLogger`]; which store
//! sits behind it is chosen by URL dialect.

mod logger;
mod record;

pub use logger::{
    open_run_logger, url_dialect, JsonlRunLogger, MemoryRunLogger, NullRunLogger, RunLogger,
};
pub use record::{HistoryRecord, RecordKey};
