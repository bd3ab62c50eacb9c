//! Hostname and local address resolution

use std::net::UdpSocket;

/// Identity of the host a sample describes
#[cfg_attr(test, mockall::automock)]
pub trait HostIdentity: Send + Sync {
    /// Hostname, `"unknown"` when the system refuses to say
    fn hostname(&self) -> String;

    /// Address of the primary local interface, `None` without a route out
    fn internal_ip(&self) -> Option<String>;
}

/// Identity read from the operating system
pub struct SystemIdentity;

impl HostIdentity for SystemIdentity {
    fn hostname(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn internal_ip(&self) -> Option<String> {
        // Connecting a UDP socket selects the outbound interface without
        // sending a packet; the chosen local address is the internal IP.
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        Some(socket.local_addr().ok()?.ip().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_never_empty() {
        let identity = SystemIdentity;
        assert!(!identity.hostname().is_empty());
    }

    #[test]
    fn test_internal_ip_is_parseable_when_present() {
        let identity = SystemIdentity;
        if let Some(ip) = identity.internal_ip() {
            assert!(ip.parse::<std::net::IpAddr>().is_ok());
        }
    }
}
