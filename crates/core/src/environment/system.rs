use std::path::{Path, PathBuf};

use crate::types::{CpuReading, MemoryPressure, MemoryReading, VolumeReading};

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Available memory below this share of total reads as critical pressure.
const CRITICAL_AVAILABLE_RATIO: f64 = 0.05;
/// Available memory below this share of total reads as warning pressure.
const WARNING_AVAILABLE_RATIO: f64 = 0.15;

/// Stateful CPU sampler. Usage is the busy share of jiffies since the
/// previous call.
#[derive(Debug)]
pub struct CpuSampler {
    prev_idle: u64,
    prev_total: u64,
    thermal_path: PathBuf,
}

impl CpuSampler {
    pub fn new() -> Self {
        let (idle, total) = read_proc_stat().unwrap_or((0, 0));
        Self {
            prev_idle: idle,
            prev_total: total,
            thermal_path: PathBuf::from(THERMAL_ZONE),
        }
    }

    /// `None` when `/proc/stat` cannot be read.
    pub fn read(&mut self) -> Option<CpuReading> {
        let (idle, total) = read_proc_stat()?;
        let usage = self.usage_since(idle, total);
        Some(CpuReading {
            total_usage: usage,
            temperature: read_temperature(&self.thermal_path),
        })
    }

    fn usage_since(&mut self, idle: u64, total: u64) -> f64 {
        let d_idle = idle.saturating_sub(self.prev_idle);
        let d_total = total.saturating_sub(self.prev_total);
        self.prev_idle = idle;
        self.prev_total = total;
        if d_total == 0 {
            return 0.0;
        }
        ((1.0 - d_idle as f64 / d_total as f64) * 100.0).clamp(0.0, 100.0)
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// `(idle, total)` jiffies from the aggregate `cpu` line. Idle includes iowait.
pub fn parse_proc_stat(s: &str) -> Option<(u64, u64)> {
    let line = s.lines().find(|l| l.starts_with("cpu "))?;
    let vals: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if vals.len() < 4 {
        return None;
    }
    let idle = vals[3] + vals.get(4).copied().unwrap_or(0);
    Some((idle, vals.iter().sum()))
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<(u64, u64)> {
    parse_proc_stat(&std::fs::read_to_string("/proc/stat").ok()?)
}

#[cfg(not(target_os = "linux"))]
fn read_proc_stat() -> Option<(u64, u64)> {
    None
}

/// Millidegrees from sysfs, converted to °C.
fn read_temperature(path: &Path) -> Option<f64> {
    let raw = std::fs::read_to_string(path).ok()?;
    let milli: f64 = raw.trim().parse().ok()?;
    Some(milli / 1000.0)
}

/// Memory reading from `/proc/meminfo` text. Locked pages count as wired.
pub fn parse_meminfo(s: &str) -> Option<MemoryReading> {
    let field = |name: &str| -> Option<u64> {
        s.lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse::<u64>()
            .ok()
            .map(|kb| kb * 1024)
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    let wired = field("Unevictable:").unwrap_or(0);
    let used = total.saturating_sub(available).saturating_sub(wired);

    let ratio = if total == 0 { 0.0 } else { available as f64 / total as f64 };
    let pressure = if ratio < CRITICAL_AVAILABLE_RATIO {
        MemoryPressure::Critical
    } else if ratio < WARNING_AVAILABLE_RATIO {
        MemoryPressure::Warning
    } else {
        MemoryPressure::Normal
    };
    Some(MemoryReading { used, wired, total, pressure })
}

#[cfg(target_os = "linux")]
pub fn read_memory() -> Option<MemoryReading> {
    parse_meminfo(&std::fs::read_to_string("/proc/meminfo").ok()?)
}

#[cfg(not(target_os = "linux"))]
pub fn read_memory() -> Option<MemoryReading> {
    None
}

/// Free and total bytes of the filesystem holding `path`.
#[cfg(unix)]
pub fn read_volume(name: &str, path: &Path) -> Option<VolumeReading> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        tracing::debug!(path = %path.display(), error = %std::io::Error::last_os_error(), "statvfs failed");
        return None;
    }
    let block = stat.f_frsize as u64;
    Some(VolumeReading {
        name: name.to_string(),
        total: stat.f_blocks as u64 * block,
        free: stat.f_bavail as u64 * block,
    })
}

#[cfg(not(unix))]
pub fn read_volume(_name: &str, _path: &Path) -> Option<VolumeReading> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\nintr 1\n";

    const MEMINFO: &str = "\
MemTotal:       16000000 kB
MemFree:          500000 kB
MemAvailable:    4000000 kB
Unevictable:      100000 kB
";

    #[test]
    fn proc_stat_aggregate_line() {
        assert_eq!(parse_proc_stat(PROC_STAT), Some((850, 1000)));
        assert_eq!(parse_proc_stat("intr 1\n"), None);
    }

    #[test]
    fn usage_is_a_delta() {
        let mut s = CpuSampler { prev_idle: 850, prev_total: 1000, thermal_path: PathBuf::new() };
        // 100 more jiffies, 25 of them idle
        let usage = s.usage_since(875, 1100);
        assert!((usage - 75.0).abs() < 1e-9);
        assert_eq!(s.usage_since(875, 1100), 0.0);
    }

    #[test]
    fn meminfo_fields_and_pressure() {
        let m = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(m.total, 16_000_000 * 1024);
        assert_eq!(m.wired, 100_000 * 1024);
        assert_eq!(m.used, 11_900_000 * 1024);
        assert_eq!(m.pressure, MemoryPressure::Normal);
        assert!((m.used_percent() - 75.0).abs() < 1e-9);

        let tight = MEMINFO.replace("MemAvailable:    4000000", "MemAvailable:     400000");
        assert_eq!(parse_meminfo(&tight).unwrap().pressure, MemoryPressure::Critical);
        let low = MEMINFO.replace("MemAvailable:    4000000", "MemAvailable:    2000000");
        assert_eq!(parse_meminfo(&low).unwrap().pressure, MemoryPressure::Warning);
    }

    #[test]
    fn meminfo_without_available_is_unknown() {
        assert!(parse_meminfo("MemTotal: 10 kB\n").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn root_volume_is_readable() {
        let v = read_volume("root", Path::new("/")).unwrap();
        assert!(v.total > 0);
        assert!(v.free <= v.total);
    }
}
