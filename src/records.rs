//! Persisted record types for the telemetry agent
//!
//! This module defines the two append-only record types the agent produces:
//! a per-tick host metrics sample and a detected SSH login event. Records
//! are handed to the persistence sink and never retained or mutated.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One host metrics sample, produced once per poll tick
///
/// Every field is gathered fresh on the tick that produces the row; a row is
/// never updated after insert. Latency and IP fields are `None` when the
/// corresponding probe or lookup failed on that tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// When the sample was assembled (second precision)
    pub timestamp: Timestamp,
    /// Hostname of the sampled machine
    pub hostname: String,
    /// Address of the primary local interface, if discoverable
    pub internal_ip: Option<String>,
    /// Externally visible address reported by the IP-echo service
    pub external_ip: Option<String>,
    /// Aggregate CPU usage over the sampling window, 0-100
    pub cpu_percent_used: f64,
    /// Memory in use as a percentage of total, 0-100
    pub memory_percent_used: f64,
    /// Root filesystem usage as a percentage of total, 0-100
    pub disk_percent_used: f64,
    /// 1-minute load average
    pub load_average: f64,
    /// Average round-trip time to the default gateway in milliseconds
    pub latency_gateway: Option<f64>,
    /// Average round-trip time to the external probe host in milliseconds
    pub latency_external: Option<f64>,
    /// Memory in use, megabytes
    pub memory_mb_used: f64,
    /// Memory available, megabytes
    pub memory_mb_free: f64,
    /// Root filesystem space in use, megabytes
    pub disk_mb_used: f64,
    /// Root filesystem space free, megabytes
    pub disk_mb_free: f64,
}

/// A successful SSH login detected in the auth log
///
/// The timestamp records when the line was detected, not when the original
/// log line was written. The line itself is stored verbatim (trailing
/// newline stripped). Repeated identical lines produce repeated records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginEvent {
    /// When the line was detected
    pub timestamp: Timestamp,
    /// The matched log line, verbatim
    pub log_entry: String,
}

impl LoginEvent {
    /// Build an event for a matched line, stamped with the current time
    pub fn detected_now(line: &str) -> Self {
        Self {
            timestamp: second_precision(Utc::now()),
            log_entry: line.trim_end_matches('\n').to_string(),
        }
    }
}

/// Truncate a timestamp to whole seconds
///
/// Persisted timestamps carry second precision; sub-second noise would only
/// differ between otherwise identical rows.
pub fn second_precision(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metric_sample_serialization_round_trip() {
        let sample = MetricSample {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 45).unwrap(),
            hostname: "web01".to_string(),
            internal_ip: Some("192.168.1.10".to_string()),
            external_ip: None,
            cpu_percent_used: 12.34,
            memory_percent_used: 56.78,
            disk_percent_used: 90.12,
            load_average: 1.23,
            latency_gateway: Some(0.45),
            latency_external: None,
            memory_mb_used: 4096.0,
            memory_mb_free: 12288.0,
            disk_mb_used: 100_000.0,
            disk_mb_free: 20_000.0,
        };

        let encoded = serde_json::to_string(&sample).unwrap();
        let decoded: MetricSample = serde_json::from_str(&encoded).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn test_second_precision_drops_subseconds() {
        let ts = Utc
            .with_ymd_and_hms(2025, 6, 1, 12, 30, 45)
            .unwrap()
            .with_nanosecond(987_654_321)
            .unwrap();
        let truncated = second_precision(ts);
        assert_eq!(truncated.nanosecond(), 0);
        assert_eq!(truncated.second(), 45);
    }

    #[test]
    fn test_login_event_strips_trailing_newline_only() {
        let event = LoginEvent::detected_now("sshd[123]: Accepted password for alice\n");
        assert_eq!(event.log_entry, "sshd[123]: Accepted password for alice");

        // Interior whitespace stays untouched
        let event = LoginEvent::detected_now("  padded line  \n");
        assert_eq!(event.log_entry, "  padded line  ");
    }

    #[test]
    fn test_login_event_timestamp_is_second_precision() {
        let event = LoginEvent::detected_now("sshd[1]: Accepted publickey for bob");
        assert_eq!(event.timestamp.nanosecond(), 0);
    }
}
