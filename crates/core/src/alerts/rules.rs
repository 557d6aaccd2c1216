use serde::{Deserialize, Serialize};

use crate::types::Category;

/// The closed set of alert rules. Each one keeps its own cooldown clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    CpuUsageHigh,
    CpuTempHigh,
    MemoryPressure,
    PacketLoss,
    HighJitter,
    LowDisk,
    LowBattery,
    NetworkIncident,
}

impl AlertRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuUsageHigh => "cpu_usage_high",
            Self::CpuTempHigh => "cpu_temp_high",
            Self::MemoryPressure => "memory_pressure",
            Self::PacketLoss => "packet_loss",
            Self::HighJitter => "high_jitter",
            Self::LowDisk => "low_disk",
            Self::LowBattery => "low_battery",
            Self::NetworkIncident => "network_incident",
        }
    }

    /// Timeline category for events this rule produces.
    pub fn category(&self) -> Category {
        match self {
            Self::CpuUsageHigh | Self::CpuTempHigh | Self::MemoryPressure => Category::Alert,
            Self::PacketLoss | Self::HighJitter | Self::NetworkIncident => Category::Network,
            Self::LowDisk => Category::Disk,
            Self::LowBattery => Category::Battery,
        }
    }
}

/// Whether `hour` falls in the quiet window `[start, end)`.
///
/// `start == end` means always quiet; `start > end` wraps past midnight.
pub fn is_quiet_hour(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        return hour >= start && hour < end;
    }
    hour >= start || hour < end
}
