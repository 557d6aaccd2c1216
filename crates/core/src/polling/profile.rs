use std::time::Duration;

use crate::config::LoadwatchCfg;
use crate::types::MonitorKind;

/// Resolved poll interval for every monitor. One profile is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingProfile {
    pub cpu: Duration,
    pub memory: Duration,
    pub network: Duration,
    pub wifi: Duration,
    pub disk: Duration,
    pub processes: Duration,
    pub battery: Duration,
    pub power_save: bool,
}

impl PollingProfile {
    /// Normal mode uses base intervals verbatim; power-save scales each one.
    pub fn resolve(cfg: &LoadwatchCfg, power_save: bool) -> Self {
        let pick = |kind: MonitorKind| {
            let base = cfg.base_interval(kind);
            if power_save {
                let (multiplier, floor) = cfg.power_save_scaling(kind);
                scale_interval(base, multiplier, floor)
            } else {
                base
            }
        };
        Self {
            cpu: pick(MonitorKind::Cpu),
            memory: pick(MonitorKind::Memory),
            network: pick(MonitorKind::Network),
            wifi: pick(MonitorKind::Wifi),
            disk: pick(MonitorKind::Disk),
            processes: pick(MonitorKind::Processes),
            battery: pick(MonitorKind::Battery),
            power_save,
        }
    }

    pub fn interval(&self, kind: MonitorKind) -> Duration {
        match kind {
            MonitorKind::Cpu => self.cpu,
            MonitorKind::Memory => self.memory,
            MonitorKind::Network => self.network,
            MonitorKind::Wifi => self.wifi,
            MonitorKind::Disk => self.disk,
            MonitorKind::Processes => self.processes,
            MonitorKind::Battery => self.battery,
        }
    }
}

/// `max(base * multiplier, floor, base)`: never faster than normal mode.
/// A negative or non-finite multiplier leaves the base unscaled.
pub fn scale_interval(base: Duration, multiplier: f64, floor: Duration) -> Duration {
    let scaled = Duration::try_from_secs_f64(base.as_secs_f64() * multiplier).unwrap_or(base);
    scaled.max(floor).max(base)
}
