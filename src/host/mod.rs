/// Host telemetry samplers for CPU, memory, disk and load
pub mod telemetry;

/// Network probes behind narrow capability traits
pub mod probes;

/// Hostname and local address resolution
pub mod identity;

pub use identity::{HostIdentity, SystemIdentity};
pub use probes::{ExternalIp, HttpExternalIp, IpRouteTable, PingProber, Prober, RouteTable};
pub use telemetry::{DiskDetail, MemoryDetail, ProcTelemetry, Telemetry};
