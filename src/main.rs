use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use vigil::collectors::{HostProviders, LoginTailer, MetricsPoller};
use vigil::config::Config;
use vigil::host::{HttpExternalIp, IpRouteTable, PingProber, ProcTelemetry, SystemIdentity};
use vigil::sink::{PostgresSink, RecordSink};

/// Command-line arguments for the vigil agent
#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Host telemetry sampler and SSH login recorder",
    long_about = "Periodically samples host-level telemetry (CPU, memory, disk, load, \
                  network latency) and tails the authentication log for successful SSH \
                  logins, persisting both streams to a relational store."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// Missing config files are not an error here; `Config::load` falls
    /// back to defaults for those. Only a path that exists but is not a
    /// regular file is rejected.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }
        Ok(())
    }

    /// Convert the config path to a string, handling non-UTF-8 paths
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }
}

/// Process supervisor owning the two collector loops
///
/// The supervisor starts both loops as independent background components
/// and then blocks the main thread until a shutdown signal arrives. The
/// loops never coordinate with each other; they share only the database
/// they both write to.
struct Supervisor {
    poller: MetricsPoller,
    tailer: LoginTailer,
    shutdown_sender: Sender<()>,
    shutdown_receiver: Receiver<()>,
}

impl Supervisor {
    /// Wire the real providers and sink from the loaded configuration
    fn new(config: Config) -> Self {
        let metrics = &config.metrics;

        let providers = HostProviders {
            telemetry: Arc::new(ProcTelemetry::new()),
            prober: Arc::new(PingProber::new(
                metrics.probe_count,
                metrics.probe_timeout_secs,
            )),
            routes: Arc::new(IpRouteTable),
            external_ip: Arc::new(HttpExternalIp::new(
                metrics.ip_echo_url.clone(),
                Duration::from_secs(5),
            )),
            identity: Arc::new(SystemIdentity),
        };

        let sink: Arc<dyn RecordSink> = Arc::new(PostgresSink::new(config.database.clone()));

        let poller = MetricsPoller::new(
            Duration::from_secs(metrics.polling_interval),
            metrics.external_probe_host.clone(),
            providers,
            Arc::clone(&sink),
        );
        let tailer = LoginTailer::new(config.auth_log.path.clone(), sink);

        let (shutdown_sender, shutdown_receiver) = mpsc::channel();

        Self {
            poller,
            tailer,
            shutdown_sender,
            shutdown_receiver,
        }
    }

    /// Start both loops as independent, non-joined background tasks
    fn start(&mut self) {
        self.poller.start();
        self.tailer.start();
        info!("All collector loops started");
    }

    /// Block until a shutdown signal arrives
    ///
    /// The periodic timeout is a no-op wake that keeps the main thread
    /// parked without consuming anything.
    fn wait_for_shutdown(&self) {
        loop {
            match self.shutdown_receiver.recv_timeout(Duration::from_secs(60)) {
                Ok(()) => {
                    info!("Shutdown signal received");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Shutdown channel disconnected");
                    break;
                }
            }
        }
    }

    /// Stop both loops
    fn stop(&mut self) {
        self.poller.stop();
        self.tailer.stop();
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting vigil agent");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config_path = match cli.config_path_str() {
        Ok(path) => path,
        Err(e) => {
            error!("Invalid configuration path: {}", e);
            std::process::exit(1);
        }
    };

    let config = Config::load(config_path);

    // The one fatal path: a configuration no loop can run with aborts the
    // process before any loop is spawned.
    if let Err(e) = config.validate() {
        error!("Fatal configuration error: {}", e);
        std::process::exit(1);
    }

    let mut supervisor = Supervisor::new(config);
    supervisor.start();

    let shutdown_sender = supervisor.shutdown_sender.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .expect("Error setting SIGINT handler for graceful shutdown");

    info!("vigil is running. Press Ctrl+C to stop.");

    supervisor.wait_for_shutdown();
    supervisor.stop();

    info!("vigil shutdown complete");
}
