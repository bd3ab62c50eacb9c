//! Network probes behind narrow capability traits
//!
//! The metrics poll loop needs three facts the host can only answer through
//! external commands or the network: the round-trip time to a target, the
//! default gateway address, and the externally visible IP. Each is exposed
//! as a one-method trait so tests can substitute a double for the real
//! command-backed implementation.

use log::{debug, warn};
use std::net::IpAddr;
use std::process::Command;
use std::time::Duration;

/// Round-trip latency probe
#[cfg_attr(test, mockall::automock)]
pub trait Prober: Send + Sync {
    /// Average round-trip time to `host` in milliseconds
    ///
    /// `None` when the probe command fails, the target is unreachable, or
    /// the output cannot be parsed.
    fn average_rtt(&self, host: &str) -> Option<f64>;
}

/// Probe backed by the system `ping` utility
pub struct PingProber {
    count: u32,
    timeout_secs: u64,
}

impl PingProber {
    /// Prober issuing `count` echo requests with a per-probe timeout
    pub fn new(count: u32, timeout_secs: u64) -> Self {
        Self {
            count,
            timeout_secs,
        }
    }
}

impl Prober for PingProber {
    fn average_rtt(&self, host: &str) -> Option<f64> {
        let output = Command::new("ping")
            .args([
                "-n",
                "-q",
                "-c",
                &self.count.to_string(),
                "-W",
                &self.timeout_secs.to_string(),
                host,
            ])
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run ping for {}: {}", host, e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("ping reported {} unreachable", host);
            return None;
        }

        parse_rtt_average(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Pull the average out of ping's rtt summary line
///
/// The summary has the shape
/// `rtt min/avg/max/mdev = 0.045/0.052/0.061/0.007 ms`.
pub(crate) fn parse_rtt_average(output: &str) -> Option<f64> {
    let line = output.lines().find(|line| line.contains("min/avg/max"))?;
    let stats = line.split('=').nth(1)?;
    let avg = stats.trim().split('/').nth(1)?;
    avg.parse().ok()
}

/// Routing table lookup
#[cfg_attr(test, mockall::automock)]
pub trait RouteTable: Send + Sync {
    /// Address of the default gateway, `None` when undiscoverable
    fn default_gateway(&self) -> Option<String>;
}

/// Routing table read through `ip route`
pub struct IpRouteTable;

impl RouteTable for IpRouteTable {
    fn default_gateway(&self) -> Option<String> {
        let output = Command::new("ip").args(["route", "show", "default"]).output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run ip route: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("ip route reported no default route");
            return None;
        }

        parse_default_gateway(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Pull the gateway address out of `ip route show default` output
///
/// The route line has the shape `default via 192.168.1.1 dev eth0 ...`.
pub(crate) fn parse_default_gateway(output: &str) -> Option<String> {
    let line = output
        .lines()
        .find(|line| line.trim_start().starts_with("default"))?;
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "via" {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

/// Externally visible address lookup
#[cfg_attr(test, mockall::automock)]
pub trait ExternalIp: Send + Sync {
    /// The address the public internet sees for this host, `None` on failure
    fn lookup(&self) -> Option<String>;
}

/// Lookup against an HTTP IP-echo service
pub struct HttpExternalIp {
    url: String,
    timeout: Duration,
}

impl HttpExternalIp {
    /// Lookup against `url` with a bounded request timeout
    pub fn new(url: String, timeout: Duration) -> Self {
        Self { url, timeout }
    }
}

impl ExternalIp for HttpExternalIp {
    fn lookup(&self) -> Option<String> {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client: {}", e);
                return None;
            }
        };

        let body = match client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
        {
            Ok(body) => body,
            Err(e) => {
                debug!("External IP lookup failed: {}", e);
                return None;
            }
        };

        // The echo service answers with a bare address; anything else is
        // treated as a failed lookup rather than persisted verbatim.
        match body.trim().parse::<IpAddr>() {
            Ok(addr) => Some(addr.to_string()),
            Err(_) => {
                debug!("External IP service returned unparseable body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING_OUTPUT: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.

--- 8.8.8.8 ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 11.123/12.456/13.789/1.333 ms
";

    #[test]
    fn test_parse_rtt_average_from_summary() {
        let avg = parse_rtt_average(PING_OUTPUT).unwrap();
        assert!((avg - 12.456).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rtt_average_rejects_incomplete_output() {
        // No summary line at all (e.g. 100% packet loss on some platforms)
        let lost = "\
PING 10.255.255.1 (10.255.255.1) 56(84) bytes of data.

--- 10.255.255.1 ping statistics ---
2 packets transmitted, 0 received, 100% packet loss, time 1014ms
";
        assert_eq!(parse_rtt_average(lost), None);
        assert_eq!(parse_rtt_average(""), None);
        assert_eq!(parse_rtt_average("rtt min/avg/max/mdev = garbage ms"), None);
    }

    #[test]
    fn test_parse_default_gateway() {
        let output = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n";
        assert_eq!(
            parse_default_gateway(output),
            Some("192.168.1.1".to_string())
        );
    }

    #[test]
    fn test_parse_default_gateway_picks_first_default_route() {
        let output = "default via 10.0.0.1 dev wlan0 metric 600\n\
                      default via 192.168.1.1 dev eth0 metric 100\n";
        assert_eq!(parse_default_gateway(output), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_parse_default_gateway_handles_missing_route() {
        assert_eq!(parse_default_gateway(""), None);
        assert_eq!(parse_default_gateway("169.254.0.0/16 dev eth0 scope link\n"), None);
        // A default route without a via hop (point-to-point)
        assert_eq!(parse_default_gateway("default dev ppp0 scope link\n"), None);
    }

    #[test]
    fn test_ping_prober_unreachable_target_returns_none() {
        // Reserved TEST-NET-1 address, one probe, shortest timeout
        let prober = PingProber::new(1, 1);
        assert_eq!(prober.average_rtt("192.0.2.1"), None);
    }

    #[test]
    fn test_external_ip_lookup_failure_returns_none() {
        // Nothing listens on this port; the lookup must degrade, not panic
        let lookup = HttpExternalIp::new(
            "http://127.0.0.1:1/ip".to_string(),
            Duration::from_millis(200),
        );
        assert_eq!(lookup.lookup(), None);
    }
}
