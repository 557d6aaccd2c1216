use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{BatteryReading, CpuReading, MemoryReading, NetworkHealthSnapshot, VolumeReading};

/// Latest reading from every monitor. Any slot may be empty.
#[derive(Debug, Clone, Default)]
pub struct CurrentMetrics {
    pub cpu: Option<CpuReading>,
    pub memory: Option<MemoryReading>,
    /// Mounted volumes; the first one is the primary volume.
    pub volumes: Vec<VolumeReading>,
    pub battery: Option<BatteryReading>,
    pub network: Option<NetworkHealthSnapshot>,
}

impl CurrentMetrics {
    pub fn primary_volume(&self) -> Option<&VolumeReading> {
        self.volumes.first()
    }
}

/// Shared current-value cache. Monitors write on their own schedules;
/// evaluators take cheap snapshots.
#[derive(Debug, Clone, Default)]
pub struct MetricsCache {
    inner: Arc<RwLock<CurrentMetrics>>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CurrentMetrics> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CurrentMetrics> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> CurrentMetrics {
        self.read().clone()
    }

    pub fn network(&self) -> Option<NetworkHealthSnapshot> {
        self.read().network.clone()
    }

    pub fn battery(&self) -> Option<BatteryReading> {
        self.read().battery
    }

    pub fn set_cpu(&self, reading: Option<CpuReading>) {
        self.write().cpu = reading;
    }

    pub fn set_memory(&self, reading: Option<MemoryReading>) {
        self.write().memory = reading;
    }

    pub fn set_volumes(&self, volumes: Vec<VolumeReading>) {
        self.write().volumes = volumes;
    }

    pub fn set_battery(&self, reading: Option<BatteryReading>) {
        self.write().battery = reading;
    }

    pub fn set_network(&self, snapshot: Option<NetworkHealthSnapshot>) {
        self.write().network = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let cache = MetricsCache::new();
        let writer = cache.clone();
        writer.set_cpu(Some(CpuReading { total_usage: 42.0, temperature: None }));
        writer.set_volumes(vec![
            VolumeReading { name: "root".into(), total: 10, free: 5 },
            VolumeReading { name: "data".into(), total: 10, free: 1 },
        ]);

        let snap = cache.snapshot();
        assert_eq!(snap.cpu.map(|c| c.total_usage), Some(42.0));
        assert_eq!(snap.primary_volume().map(|v| v.name.as_str()), Some("root"));
        assert!(snap.battery.is_none());
    }
}
