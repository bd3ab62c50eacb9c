//! Persistence sink
//!
//! A sink persists exactly one record per call. The database-backed
//! implementation opens its own short-lived connection for every write and
//! releases it before returning, success or failure; there is no pooling,
//! no retry and no queueing. Callers treat the sink as fire-and-forget: a
//! failed write is logged and the record is dropped.

use crate::error::SinkError;
use crate::records::{LoginEvent, MetricSample};

/// Connection-per-write PostgreSQL sink
pub mod postgres_sink;

/// In-memory sink double for tests
pub mod memory_sink;

/// Write path for persisted records
pub trait RecordSink: Send + Sync {
    /// Persist one metrics sample
    ///
    /// # Errors
    ///
    /// Returns `SinkError` when the record could not be stored; the record
    /// is dropped and the caller is expected to log and continue.
    fn write_metrics(&self, sample: &MetricSample) -> Result<(), SinkError>;

    /// Persist one login event
    ///
    /// # Errors
    ///
    /// Same contract as [`RecordSink::write_metrics`].
    fn write_login(&self, event: &LoginEvent) -> Result<(), SinkError>;
}

pub use memory_sink::MemorySink;
pub use postgres_sink::PostgresSink;
