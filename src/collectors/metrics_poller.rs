//! Metrics poll loop
//!
//! On a fixed interval the loop gathers every sampler output plus host
//! identity into a single record and hands it to the sink. Sampler failures
//! degrade to default values inside the samplers; sink failures are logged
//! and the record is dropped. The loop itself never stops on an error.

use crate::collectors::sleep_while_running;
use crate::host::{ExternalIp, HostIdentity, Prober, RouteTable, Telemetry};
use crate::records::{second_precision, MetricSample};
use crate::sink::RecordSink;
use chrono::Utc;
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Capability handles the poll loop reads the host through
///
/// Bundling them keeps the loop constructor honest about everything a tick
/// touches and lets tests substitute any subset.
#[derive(Clone)]
pub struct HostProviders {
    pub telemetry: Arc<dyn Telemetry>,
    pub prober: Arc<dyn Prober>,
    pub routes: Arc<dyn RouteTable>,
    pub external_ip: Arc<dyn ExternalIp>,
    pub identity: Arc<dyn HostIdentity>,
}

/// Background loop producing one [`MetricSample`] per tick
pub struct MetricsPoller {
    interval: Duration,
    external_probe_host: String,
    providers: HostProviders,
    sink: Arc<dyn RecordSink>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl MetricsPoller {
    /// Wire a poll loop from immutable settings and capability handles
    ///
    /// The interval is fixed for the life of the loop; changing it requires
    /// a process restart.
    pub fn new(
        interval: Duration,
        external_probe_host: String,
        providers: HostProviders,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            interval,
            external_probe_host,
            providers,
            sink,
            thread_handle: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Start the poll loop on a background thread
    ///
    /// Starting an already-running poller is a no-op.
    pub fn start(&mut self) {
        {
            let mut running = self.running.lock().unwrap();
            if *running {
                return;
            }
            *running = true;
        }

        let interval = self.interval;
        let external_probe_host = self.external_probe_host.clone();
        let providers = self.providers.clone();
        let sink = Arc::clone(&self.sink);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            Self::poll_loop(interval, external_probe_host, providers, sink, running);
        });

        self.thread_handle = Some(handle);
        info!("Metrics poller started with interval {:?}", self.interval);
    }

    /// Signal the loop to stop and wait for the thread to finish
    pub fn stop(&mut self) {
        {
            let mut running = self.running.lock().unwrap();
            if !*running {
                return;
            }
            *running = false;
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Failed to join metrics poller thread");
            }
        }
        info!("Metrics poller stopped");
    }

    /// Whether the loop is currently running
    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn poll_loop(
        interval: Duration,
        external_probe_host: String,
        providers: HostProviders,
        sink: Arc<dyn RecordSink>,
        running: Arc<Mutex<bool>>,
    ) {
        while *running.lock().unwrap() {
            let sample = collect_sample(&providers, &external_probe_host);
            debug!(
                "Assembled sample for {}: cpu {:.1}%, mem {:.1}%, disk {:.1}%",
                sample.hostname,
                sample.cpu_percent_used,
                sample.memory_percent_used,
                sample.disk_percent_used
            );

            if let Err(e) = sink.write_metrics(&sample) {
                error!("Failed to persist metrics sample: {}", e);
            }

            // The sleep is the full configured interval, not adjusted for
            // time already spent sampling, so the effective period is
            // interval + sampling cost. No catch-up on overrun.
            sleep_while_running(interval, &running);
        }

        {
            let mut running_flag = running.lock().unwrap();
            *running_flag = false;
        }
        info!("Metrics poll loop finished");
    }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Run one poll tick: sample, resolve identity, probe, assemble
///
/// Samplers run sequentially; the CPU sampler alone blocks for about a
/// second. The gateway probe is skipped when no default gateway can be
/// discovered on this tick.
pub(crate) fn collect_sample(
    providers: &HostProviders,
    external_probe_host: &str,
) -> MetricSample {
    let cpu_percent_used = providers.telemetry.cpu_percent();
    let memory = providers.telemetry.memory_detail();
    let disk = providers.telemetry.disk_detail();
    let load_average = providers.telemetry.load_average();

    let hostname = providers.identity.hostname();
    let internal_ip = providers.identity.internal_ip();
    let external_ip = providers.external_ip.lookup();

    let latency_gateway = providers
        .routes
        .default_gateway()
        .and_then(|gateway| providers.prober.average_rtt(&gateway));
    let latency_external = providers.prober.average_rtt(external_probe_host);

    MetricSample {
        timestamp: second_precision(Utc::now()),
        hostname,
        internal_ip,
        external_ip,
        cpu_percent_used,
        memory_percent_used: memory.percent_used,
        disk_percent_used: disk.percent_used,
        load_average,
        latency_gateway,
        latency_external,
        memory_mb_used: memory.mb_used,
        memory_mb_free: memory.mb_free,
        disk_mb_used: disk.mb_used,
        disk_mb_free: disk.mb_free,
    }
}
