//! Connection-per-write PostgreSQL sink

use crate::config::DatabaseConfig;
use crate::error::SinkError;
use crate::records::{LoginEvent, MetricSample};
use crate::sink::RecordSink;
use log::debug;
use postgres::{Client, NoTls};
use std::time::Duration;

const INSERT_METRICS: &str = "INSERT INTO metric_samples (\
     \"timestamp\", hostname, internal_ip, external_ip, \
     cpu_percent_used, memory_percent_used, disk_percent_used, load_average, \
     latency_gateway, latency_external, \
     memory_mb_used, memory_mb_free, disk_mb_used, disk_mb_free) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)";

const INSERT_LOGIN: &str =
    "INSERT INTO login_events (\"timestamp\", log_entry) VALUES ($1, $2)";

/// Sink writing to PostgreSQL with one short-lived connection per record
///
/// The connection is opened inside the write call and dropped before it
/// returns, on the success and failure paths alike. Losing a record on
/// transient database unavailability is accepted; the next write always
/// starts from a fresh connection.
pub struct PostgresSink {
    db: DatabaseConfig,
}

impl PostgresSink {
    /// Sink writing with the given credentials
    pub fn new(db: DatabaseConfig) -> Self {
        Self { db }
    }

    fn connect(&self) -> Result<Client, SinkError> {
        let mut config = postgres::Config::new();
        config
            .host(&self.db.host)
            .port(self.db.port)
            .user(&self.db.user)
            .dbname(&self.db.dbname)
            .connect_timeout(Duration::from_secs(5));
        if !self.db.password.is_empty() {
            config.password(&self.db.password);
        }
        Ok(config.connect(NoTls)?)
    }
}

impl RecordSink for PostgresSink {
    fn write_metrics(&self, sample: &MetricSample) -> Result<(), SinkError> {
        let mut client = self.connect()?;
        let rows = client.execute(
            INSERT_METRICS,
            &[
                &sample.timestamp,
                &sample.hostname,
                &sample.internal_ip,
                &sample.external_ip,
                &sample.cpu_percent_used,
                &sample.memory_percent_used,
                &sample.disk_percent_used,
                &sample.load_average,
                &sample.latency_gateway,
                &sample.latency_external,
                &sample.memory_mb_used,
                &sample.memory_mb_free,
                &sample.disk_mb_used,
                &sample.disk_mb_free,
            ],
        )?;
        debug!("Inserted {} metrics row for {}", rows, sample.hostname);
        Ok(())
    }

    fn write_login(&self, event: &LoginEvent) -> Result<(), SinkError> {
        let mut client = self.connect()?;
        client.execute(INSERT_LOGIN, &[&event.timestamp, &event.log_entry])?;
        debug!("Inserted login event row");
        Ok(())
    }
}
