//! In-memory sink double for tests
//!
//! Mirrors the shape of the database-backed sink without a database:
//! records land in vectors, and a failure switch lets tests exercise the
//! callers' log-and-continue error containment.

use crate::error::SinkError;
use crate::records::{LoginEvent, MetricSample};
use crate::sink::RecordSink;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Sink double that stores records in memory
#[derive(Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<MetricSample>>,
    logins: Mutex<Vec<LoginEvent>>,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
}

impl MemorySink {
    /// Sink that accepts every write
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every write
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_writes.store(true, Ordering::SeqCst);
        sink
    }

    /// Flip whether subsequent writes fail
    pub fn set_failing(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write calls received, including rejected ones
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored metrics samples
    pub fn metrics(&self) -> Vec<MetricSample> {
        self.metrics.lock().unwrap().clone()
    }

    /// Snapshot of the stored login events
    pub fn logins(&self) -> Vec<LoginEvent> {
        self.logins.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), SinkError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SinkError::Unavailable("memory sink set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RecordSink for MemorySink {
    fn write_metrics(&self, sample: &MetricSample) -> Result<(), SinkError> {
        self.check_available()?;
        self.metrics.lock().unwrap().push(sample.clone());
        Ok(())
    }

    fn write_login(&self, event: &LoginEvent) -> Result<(), SinkError> {
        self.check_available()?;
        self.logins.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_stores_records() {
        let sink = MemorySink::new();
        let event = LoginEvent::detected_now("sshd[1]: Accepted password for alice");
        sink.write_login(&event).unwrap();

        assert_eq!(sink.logins(), vec![event]);
        assert_eq!(sink.write_attempts(), 1);
    }

    #[test]
    fn test_failing_sink_rejects_but_counts_attempts() {
        let sink = MemorySink::failing();
        let event = LoginEvent::detected_now("sshd[1]: Accepted password for alice");

        assert!(sink.write_login(&event).is_err());
        assert!(sink.logins().is_empty());
        assert_eq!(sink.write_attempts(), 1);

        sink.set_failing(false);
        assert!(sink.write_login(&event).is_ok());
        assert_eq!(sink.write_attempts(), 2);
    }
}
