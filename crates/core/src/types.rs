use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Timeline ────────────────────────────────────────────────────

/// Severity of a timeline event or presented alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Which part of the machine a timeline event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Alert,
    Network,
    Disk,
    Battery,
    Process,
    System,
}

impl Category {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Network => "network",
            Self::Disk => "disk",
            Self::Battery => "battery",
            Self::Process => "process",
            Self::System => "system",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "alert" => Some(Self::Alert),
            "network" => Some(Self::Network),
            "disk" => Some(Self::Disk),
            "battery" => Some(Self::Battery),
            "process" => Some(Self::Process),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Append-only history entry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub message: String,
}

impl TimelineEvent {
    pub fn new(
        severity: Severity,
        category: Category,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), severity, category, title, message)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        severity: Severity,
        category: Category,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            severity,
            category,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Periodic summary of the machine, written once a minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_used_percent: f64,
    /// 0 / 50 / 100 for normal / warning / critical.
    pub memory_pressure_score: f64,
    pub disk_free_percent: f64,
    pub battery_percent: Option<f64>,
    pub battery_is_charging: Option<bool>,
}

/// Lookback window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineRange {
    Last24h,
    Last7d,
}

impl TimelineRange {
    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Last24h => chrono::Duration::hours(24),
            Self::Last7d => chrono::Duration::days(7),
        }
    }
}

// ── Monitor readings ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuReading {
    /// Total usage, 0–100.
    pub total_usage: f64,
    /// Package temperature in °C, when a sensor is available.
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

impl MemoryPressure {
    pub fn score(self) -> f64 {
        match self {
            Self::Normal => 0.0,
            Self::Warning => 50.0,
            Self::Critical => 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    pub used: u64,
    pub wired: u64,
    pub total: u64,
    pub pressure: MemoryPressure,
}

impl MemoryReading {
    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used + self.wired) as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReading {
    pub name: String,
    pub total: u64,
    pub free: u64,
}

impl VolumeReading {
    /// Free space as a percentage. An empty volume reads as fully free.
    pub fn free_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.free as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Battery,
    Ac,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub charge_percent: f64,
    pub is_charging: bool,
    pub power_source: PowerSource,
}

impl BatteryReading {
    /// Running from the battery and not being charged.
    pub fn is_discharging(&self) -> bool {
        self.power_source == PowerSource::Battery && !self.is_charging
    }
}

// ── Network ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
    #[serde(rename = "6GHz")]
    Ghz6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    GatewayUnreachable,
    InternetOutage,
    DnsFailure,
    UnstableLink,
}

/// A classified network condition with its fixed user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub kind: IncidentType,
    pub title: &'static str,
    pub hint: &'static str,
}

/// One reading of network health. `None` means "not measured", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct NetworkHealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ssid: Option<String>,
    pub router_ip: Option<String>,
    pub band: Option<Band>,
    pub link_rate_mbps: Option<f64>,
    pub signal_dbm: Option<i32>,
    pub noise_dbm: Option<i32>,
    pub router_ping: Option<f64>,
    pub router_jitter: Option<f64>,
    pub router_loss: Option<f64>,
    pub internet_ping: Option<f64>,
    pub internet_jitter: Option<f64>,
    pub internet_loss: Option<f64>,
    pub dns_lookup_ms: Option<f64>,
    pub dns_server: Option<String>,
    pub incident: Option<Incident>,
}

impl NetworkHealthSnapshot {
    /// Worse of router and internet loss; unknown counts as zero.
    pub fn worst_loss(&self) -> f64 {
        self.router_loss
            .unwrap_or(0.0)
            .max(self.internet_loss.unwrap_or(0.0))
    }

    /// Worse of router and internet jitter; unknown counts as zero.
    pub fn worst_jitter(&self) -> f64 {
        self.router_jitter
            .unwrap_or(0.0)
            .max(self.internet_jitter.unwrap_or(0.0))
    }
}

// ── Polling ─────────────────────────────────────────────────────

/// Every monitor whose cadence the coordinator controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    Cpu,
    Memory,
    Network,
    Wifi,
    Disk,
    Processes,
    Battery,
}

impl MonitorKind {
    pub const ALL: [MonitorKind; 7] = [
        Self::Cpu,
        Self::Memory,
        Self::Network,
        Self::Wifi,
        Self::Disk,
        Self::Processes,
        Self::Battery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Network => "network",
            Self::Wifi => "wifi",
            Self::Disk => "disk",
            Self::Processes => "processes",
            Self::Battery => "battery",
        }
    }
}

impl std::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
