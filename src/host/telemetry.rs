//! Host telemetry samplers
//!
//! Each sampler computes one metric from a host-provided interface and
//! degrades to a default value when the source is unreadable. A sampler
//! failure never aborts the tick that invoked it; it is logged and the
//! tick proceeds with the degraded value.

use crate::error::SamplerError;
use log::warn;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Memory usage detail for one sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemoryDetail {
    /// Memory in use as a percentage of total, 0-100
    pub percent_used: f64,
    /// Memory in use, megabytes
    pub mb_used: f64,
    /// Memory available, megabytes
    pub mb_free: f64,
}

/// Root filesystem usage detail for one sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiskDetail {
    /// Space in use as a percentage of total, 0-100
    pub percent_used: f64,
    /// Space in use, megabytes
    pub mb_used: f64,
    /// Space free, megabytes
    pub mb_free: f64,
}

/// Source of host telemetry values
///
/// The metrics poll loop reads every metric through this trait so tests can
/// substitute fixed values for the `/proc`-backed implementation.
#[cfg_attr(test, mockall::automock)]
pub trait Telemetry: Send + Sync {
    /// Aggregate CPU usage over the sampling window, 0-100
    ///
    /// The real implementation blocks for the length of the sampling window
    /// (one second by default).
    fn cpu_percent(&self) -> f64;

    /// Memory usage detail, all-zero when the source is unreadable
    fn memory_detail(&self) -> MemoryDetail;

    /// Root filesystem usage detail, all-zero when the source is unreadable
    fn disk_detail(&self) -> DiskDetail;

    /// 1-minute load average, 0.0 when the source is unreadable
    fn load_average(&self) -> f64;
}

/// Aggregate CPU counters at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    /// Sum of all time fields on the aggregate `cpu` line
    pub total: u64,
    /// Idle plus iowait time
    pub idle: u64,
}

/// CPU usage percentage between two counter snapshots
///
/// Computes `100 * (1 - idle_delta / total_delta)`. Returns exactly 0.0
/// when the counters did not advance.
pub fn cpu_percent_between(first: CpuTimes, second: CpuTimes) -> f64 {
    let total_delta = second.total.saturating_sub(first.total);
    let idle_delta = second.idle.saturating_sub(first.idle);
    if total_delta == 0 {
        return 0.0;
    }
    100.0 * (1.0 - idle_delta as f64 / total_delta as f64)
}

/// Memory detail from kilobyte counters
///
/// Percent is `100 * (total - available) / total`; the megabyte fields are
/// the same counters divided by 1024. All-zero when total is zero.
pub fn memory_detail_from(total_kb: u64, available_kb: u64) -> MemoryDetail {
    if total_kb == 0 {
        return MemoryDetail::default();
    }
    let used_kb = total_kb.saturating_sub(available_kb);
    MemoryDetail {
        percent_used: 100.0 * used_kb as f64 / total_kb as f64,
        mb_used: used_kb as f64 / 1024.0,
        mb_free: available_kb as f64 / 1024.0,
    }
}

/// Disk detail from byte counts, with used = total - free
pub fn disk_detail_from(total_bytes: f64, free_bytes: f64) -> DiskDetail {
    if total_bytes <= 0.0 {
        return DiskDetail::default();
    }
    let used_bytes = total_bytes - free_bytes;
    const MB: f64 = 1024.0 * 1024.0;
    DiskDetail {
        percent_used: 100.0 * used_bytes / total_bytes,
        mb_used: used_bytes / MB,
        mb_free: free_bytes / MB,
    }
}

/// Telemetry source backed by `/proc` and `statvfs`
pub struct ProcTelemetry {
    stat_path: PathBuf,
    meminfo_path: PathBuf,
    loadavg_path: PathBuf,
    root_path: PathBuf,
    cpu_window: Duration,
}

impl Default for ProcTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcTelemetry {
    /// Telemetry source reading the standard host interfaces
    pub fn new() -> Self {
        Self {
            stat_path: PathBuf::from("/proc/stat"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            loadavg_path: PathBuf::from("/proc/loadavg"),
            root_path: PathBuf::from("/"),
            cpu_window: Duration::from_secs(1),
        }
    }

    /// Telemetry source reading from alternate paths, for tests
    #[cfg(test)]
    pub(crate) fn with_paths(
        stat_path: PathBuf,
        meminfo_path: PathBuf,
        loadavg_path: PathBuf,
        root_path: PathBuf,
        cpu_window: Duration,
    ) -> Self {
        Self {
            stat_path,
            meminfo_path,
            loadavg_path,
            root_path,
            cpu_window,
        }
    }

    fn read_cpu_times(&self) -> Result<CpuTimes, SamplerError> {
        let contents = std::fs::read_to_string(&self.stat_path)?;
        parse_cpu_line(&contents)
    }
}

impl Telemetry for ProcTelemetry {
    fn cpu_percent(&self) -> f64 {
        let first = match self.read_cpu_times() {
            Ok(times) => times,
            Err(e) => {
                warn!("CPU sampler failed: {}", e);
                return 0.0;
            }
        };

        // The window between the two counter reads is what the usage
        // percentage describes; it deliberately blocks the tick.
        thread::sleep(self.cpu_window);

        match self.read_cpu_times() {
            Ok(second) => cpu_percent_between(first, second),
            Err(e) => {
                warn!("CPU sampler failed: {}", e);
                0.0
            }
        }
    }

    fn memory_detail(&self) -> MemoryDetail {
        let contents = match std::fs::read_to_string(&self.meminfo_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Memory sampler failed: {}", e);
                return MemoryDetail::default();
            }
        };
        match parse_meminfo(&contents) {
            Ok((total_kb, available_kb)) => memory_detail_from(total_kb, available_kb),
            Err(e) => {
                warn!("Memory sampler failed: {}", e);
                MemoryDetail::default()
            }
        }
    }

    fn disk_detail(&self) -> DiskDetail {
        match statvfs_detail(&self.root_path) {
            Ok(detail) => detail,
            Err(e) => {
                warn!("Disk sampler failed: {}", e);
                DiskDetail::default()
            }
        }
    }

    fn load_average(&self) -> f64 {
        let contents = match std::fs::read_to_string(&self.loadavg_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Load sampler failed: {}", e);
                return 0.0;
            }
        };
        match parse_loadavg(&contents) {
            Ok(load) => load,
            Err(e) => {
                warn!("Load sampler failed: {}", e);
                0.0
            }
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`
///
/// Idle time counts the idle and iowait fields; total is the sum of every
/// field on the line.
pub(crate) fn parse_cpu_line(contents: &str) -> Result<CpuTimes, SamplerError> {
    let line = contents
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| SamplerError::ParseError("no aggregate cpu line".to_string()))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|field| {
            field
                .parse::<u64>()
                .map_err(|e| SamplerError::ParseError(format!("cpu field '{}': {}", field, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if fields.len() < 4 {
        return Err(SamplerError::ParseError(format!(
            "aggregate cpu line has {} fields, expected at least 4",
            fields.len()
        )));
    }

    Ok(CpuTimes {
        total: fields.iter().sum(),
        idle: fields[3] + fields.get(4).copied().unwrap_or(0),
    })
}

/// Parse MemTotal and MemAvailable (kB) out of `/proc/meminfo`
pub(crate) fn parse_meminfo(contents: &str) -> Result<(u64, u64), SamplerError> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb_field(rest);
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }

    match (total_kb, available_kb) {
        (Some(total), Some(available)) => Ok((total, available)),
        _ => Err(SamplerError::ParseError(
            "MemTotal or MemAvailable missing".to_string(),
        )),
    }
}

fn parse_kb_field(rest: &str) -> Option<u64> {
    rest.split_whitespace().next()?.parse().ok()
}

/// Parse the 1-minute load average from `/proc/loadavg`
pub(crate) fn parse_loadavg(contents: &str) -> Result<f64, SamplerError> {
    contents
        .split_whitespace()
        .next()
        .ok_or_else(|| SamplerError::ParseError("empty loadavg".to_string()))?
        .parse()
        .map_err(|e| SamplerError::ParseError(format!("loadavg: {}", e)))
}

/// Disk detail for the filesystem containing `path`
fn statvfs_detail(path: &Path) -> Result<DiskDetail, SamplerError> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| SamplerError::ParseError("path contains a NUL byte".to_string()))?;

    let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut vfs) };
    if rc != 0 {
        return Err(SamplerError::IoError(std::io::Error::last_os_error()));
    }

    let block_size = vfs.f_frsize as f64;
    let total_bytes = vfs.f_blocks as f64 * block_size;
    let free_bytes = vfs.f_bfree as f64 * block_size;
    Ok(disk_detail_from(total_bytes, free_bytes))
}
