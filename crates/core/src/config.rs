use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::MonitorKind;

/// All loadwatch parameters. Loaded from `loadwatch_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadwatchCfg {
    // base poll intervals (ms)
    pub poll_ms_cpu: u64,
    pub poll_ms_memory: u64,
    pub poll_ms_network: u64,
    pub poll_ms_wifi: u64,
    pub poll_ms_disk: u64,
    pub poll_ms_processes: u64,
    pub poll_ms_battery: u64,

    // power-save scaling: interval = max(base * multiplier, floor)
    pub power_save_cpu_multiplier: f64,
    pub power_save_cpu_floor_ms: u64,
    pub power_save_memory_multiplier: f64,
    pub power_save_memory_floor_ms: u64,
    pub power_save_network_multiplier: f64,
    pub power_save_network_floor_ms: u64,
    pub power_save_wifi_multiplier: f64,
    pub power_save_wifi_floor_ms: u64,
    pub power_save_disk_multiplier: f64,
    pub power_save_disk_floor_ms: u64,
    pub power_save_processes_multiplier: f64,
    pub power_save_processes_floor_ms: u64,
    pub power_save_battery_multiplier: f64,
    pub power_save_battery_floor_ms: u64,

    // alerts
    pub alerts_enabled: bool,
    pub alerts_cooldown_minutes: f64,
    pub alert_tick_secs: u64,
    pub alert_debounce_secs: u64,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,

    // thresholds
    pub cpu_usage_threshold: f64,
    pub cpu_temp_threshold: f64,
    pub packet_loss_threshold: f64,
    pub jitter_threshold: f64,
    pub low_disk_free_percent: f64,
    pub low_battery_alerts_enabled: bool,
    pub low_battery_threshold: f64,

    // battery automation
    pub battery_automation_enabled: bool,
    pub battery_automation_threshold: f64,
    pub battery_automation_hysteresis: f64,
    pub power_save_active: bool,

    // network probes
    pub router_host: String,
    pub internet_host: String,
    pub probe_port: u16,
    pub dns_probe_host: String,
    pub dns_timeout_ms: u64,

    // history
    pub snapshot_interval_secs: u64,
    pub history_retention_days: i64,

    // shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for LoadwatchCfg {
    fn default() -> Self {
        Self {
            poll_ms_cpu: 1000,
            poll_ms_memory: 2000,
            poll_ms_network: 1000,
            poll_ms_wifi: 1000,
            poll_ms_disk: 5000,
            poll_ms_processes: 3000,
            poll_ms_battery: 10_000,
            power_save_cpu_multiplier: 3.0,
            power_save_cpu_floor_ms: 3000,
            power_save_memory_multiplier: 3.0,
            power_save_memory_floor_ms: 5000,
            power_save_network_multiplier: 4.0,
            power_save_network_floor_ms: 5000,
            power_save_wifi_multiplier: 4.0,
            power_save_wifi_floor_ms: 5000,
            power_save_disk_multiplier: 2.0,
            power_save_disk_floor_ms: 15_000,
            power_save_processes_multiplier: 3.0,
            power_save_processes_floor_ms: 10_000,
            power_save_battery_multiplier: 0.8,
            power_save_battery_floor_ms: 10_000,
            alerts_enabled: true,
            alerts_cooldown_minutes: 10.0,
            alert_tick_secs: 15,
            alert_debounce_secs: 5,
            quiet_hours_enabled: false,
            quiet_hours_start: 22,
            quiet_hours_end: 7,
            cpu_usage_threshold: 90.0,
            cpu_temp_threshold: 90.0,
            packet_loss_threshold: 3.0,
            jitter_threshold: 30.0,
            low_disk_free_percent: 10.0,
            low_battery_alerts_enabled: true,
            low_battery_threshold: 20.0,
            battery_automation_enabled: true,
            battery_automation_threshold: 20.0,
            battery_automation_hysteresis: 5.0,
            power_save_active: false,
            router_host: "192.168.1.1".to_string(),
            internet_host: "1.1.1.1".to_string(),
            probe_port: 80,
            dns_probe_host: "google.com".to_string(),
            dns_timeout_ms: 2000,
            snapshot_interval_secs: 60,
            history_retention_days: 7,
            shutdown_timeout_secs: 5,
        }
    }
}

impl LoadwatchCfg {
    /// Load config from `loadwatch_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM loadwatch_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `loadwatch_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO loadwatch_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Overwrite a single stored value (e.g. the persisted power-save flag).
    pub async fn store_value(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE loadwatch_config SET value = $1 WHERE key = $2")
            .bind(value)
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            poll_ms_cpu: get_or(m, "poll_ms_cpu", d.poll_ms_cpu),
            poll_ms_memory: get_or(m, "poll_ms_memory", d.poll_ms_memory),
            poll_ms_network: get_or(m, "poll_ms_network", d.poll_ms_network),
            poll_ms_wifi: get_or(m, "poll_ms_wifi", d.poll_ms_wifi),
            poll_ms_disk: get_or(m, "poll_ms_disk", d.poll_ms_disk),
            poll_ms_processes: get_or(m, "poll_ms_processes", d.poll_ms_processes),
            poll_ms_battery: get_or(m, "poll_ms_battery", d.poll_ms_battery),
            power_save_cpu_multiplier: get_or(m, "power_save_cpu_multiplier", d.power_save_cpu_multiplier),
            power_save_cpu_floor_ms: get_or(m, "power_save_cpu_floor_ms", d.power_save_cpu_floor_ms),
            power_save_memory_multiplier: get_or(m, "power_save_memory_multiplier", d.power_save_memory_multiplier),
            power_save_memory_floor_ms: get_or(m, "power_save_memory_floor_ms", d.power_save_memory_floor_ms),
            power_save_network_multiplier: get_or(m, "power_save_network_multiplier", d.power_save_network_multiplier),
            power_save_network_floor_ms: get_or(m, "power_save_network_floor_ms", d.power_save_network_floor_ms),
            power_save_wifi_multiplier: get_or(m, "power_save_wifi_multiplier", d.power_save_wifi_multiplier),
            power_save_wifi_floor_ms: get_or(m, "power_save_wifi_floor_ms", d.power_save_wifi_floor_ms),
            power_save_disk_multiplier: get_or(m, "power_save_disk_multiplier", d.power_save_disk_multiplier),
            power_save_disk_floor_ms: get_or(m, "power_save_disk_floor_ms", d.power_save_disk_floor_ms),
            power_save_processes_multiplier: get_or(m, "power_save_processes_multiplier", d.power_save_processes_multiplier),
            power_save_processes_floor_ms: get_or(m, "power_save_processes_floor_ms", d.power_save_processes_floor_ms),
            power_save_battery_multiplier: get_or(m, "power_save_battery_multiplier", d.power_save_battery_multiplier),
            power_save_battery_floor_ms: get_or(m, "power_save_battery_floor_ms", d.power_save_battery_floor_ms),
            alerts_enabled: get_or(m, "alerts_enabled", d.alerts_enabled),
            alerts_cooldown_minutes: get_or(m, "alerts_cooldown_minutes", d.alerts_cooldown_minutes),
            alert_tick_secs: get_or(m, "alert_tick_secs", d.alert_tick_secs),
            alert_debounce_secs: get_or(m, "alert_debounce_secs", d.alert_debounce_secs),
            quiet_hours_enabled: get_or(m, "quiet_hours_enabled", d.quiet_hours_enabled),
            quiet_hours_start: get_or(m, "quiet_hours_start", d.quiet_hours_start),
            quiet_hours_end: get_or(m, "quiet_hours_end", d.quiet_hours_end),
            cpu_usage_threshold: get_or(m, "cpu_usage_threshold", d.cpu_usage_threshold),
            cpu_temp_threshold: get_or(m, "cpu_temp_threshold", d.cpu_temp_threshold),
            packet_loss_threshold: get_or(m, "packet_loss_threshold", d.packet_loss_threshold),
            jitter_threshold: get_or(m, "jitter_threshold", d.jitter_threshold),
            low_disk_free_percent: get_or(m, "low_disk_free_percent", d.low_disk_free_percent),
            low_battery_alerts_enabled: get_or(m, "low_battery_alerts_enabled", d.low_battery_alerts_enabled),
            low_battery_threshold: get_or(m, "low_battery_threshold", d.low_battery_threshold),
            battery_automation_enabled: get_or(m, "battery_automation_enabled", d.battery_automation_enabled),
            battery_automation_threshold: get_or(m, "battery_automation_threshold", d.battery_automation_threshold),
            battery_automation_hysteresis: get_or(m, "battery_automation_hysteresis", d.battery_automation_hysteresis),
            power_save_active: get_or(m, "power_save_active", d.power_save_active),
            router_host: get_or(m, "router_host", d.router_host),
            internet_host: get_or(m, "internet_host", d.internet_host),
            probe_port: get_or(m, "probe_port", d.probe_port),
            dns_probe_host: get_or(m, "dns_probe_host", d.dns_probe_host),
            dns_timeout_ms: get_or(m, "dns_timeout_ms", d.dns_timeout_ms),
            snapshot_interval_secs: get_or(m, "snapshot_interval_secs", d.snapshot_interval_secs),
            history_retention_days: get_or(m, "history_retention_days", d.history_retention_days),
            shutdown_timeout_secs: get_or(m, "shutdown_timeout_secs", d.shutdown_timeout_secs),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("poll_ms_cpu", self.poll_ms_cpu.to_string(), "CPU poll interval ms"),
            ("poll_ms_memory", self.poll_ms_memory.to_string(), "Memory poll interval ms"),
            ("poll_ms_network", self.poll_ms_network.to_string(), "Network throughput poll interval ms"),
            ("poll_ms_wifi", self.poll_ms_wifi.to_string(), "Network health poll interval ms"),
            ("poll_ms_disk", self.poll_ms_disk.to_string(), "Disk poll interval ms"),
            ("poll_ms_processes", self.poll_ms_processes.to_string(), "Process list poll interval ms"),
            ("poll_ms_battery", self.poll_ms_battery.to_string(), "Battery poll interval ms"),
            ("power_save_cpu_multiplier", self.power_save_cpu_multiplier.to_string(), "Power-save CPU interval multiplier"),
            ("power_save_cpu_floor_ms", self.power_save_cpu_floor_ms.to_string(), "Power-save CPU interval floor ms"),
            ("power_save_memory_multiplier", self.power_save_memory_multiplier.to_string(), "Power-save memory interval multiplier"),
            ("power_save_memory_floor_ms", self.power_save_memory_floor_ms.to_string(), "Power-save memory interval floor ms"),
            ("power_save_network_multiplier", self.power_save_network_multiplier.to_string(), "Power-save network interval multiplier"),
            ("power_save_network_floor_ms", self.power_save_network_floor_ms.to_string(), "Power-save network interval floor ms"),
            ("power_save_wifi_multiplier", self.power_save_wifi_multiplier.to_string(), "Power-save network health interval multiplier"),
            ("power_save_wifi_floor_ms", self.power_save_wifi_floor_ms.to_string(), "Power-save network health interval floor ms"),
            ("power_save_disk_multiplier", self.power_save_disk_multiplier.to_string(), "Power-save disk interval multiplier"),
            ("power_save_disk_floor_ms", self.power_save_disk_floor_ms.to_string(), "Power-save disk interval floor ms"),
            ("power_save_processes_multiplier", self.power_save_processes_multiplier.to_string(), "Power-save process list interval multiplier"),
            ("power_save_processes_floor_ms", self.power_save_processes_floor_ms.to_string(), "Power-save process list interval floor ms"),
            ("power_save_battery_multiplier", self.power_save_battery_multiplier.to_string(), "Power-save battery interval multiplier"),
            ("power_save_battery_floor_ms", self.power_save_battery_floor_ms.to_string(), "Power-save battery interval floor ms"),
            ("alerts_enabled", self.alerts_enabled.to_string(), "Global alert switch"),
            ("alerts_cooldown_minutes", self.alerts_cooldown_minutes.to_string(), "Per-rule re-fire cooldown minutes"),
            ("alert_tick_secs", self.alert_tick_secs.to_string(), "Alert evaluation interval seconds"),
            ("alert_debounce_secs", self.alert_debounce_secs.to_string(), "Minimum spacing between presented alerts"),
            ("quiet_hours_enabled", self.quiet_hours_enabled.to_string(), "Suppress alert presentation during quiet hours"),
            ("quiet_hours_start", self.quiet_hours_start.to_string(), "Quiet hours start (local hour, inclusive)"),
            ("quiet_hours_end", self.quiet_hours_end.to_string(), "Quiet hours end (local hour, exclusive)"),
            ("cpu_usage_threshold", self.cpu_usage_threshold.to_string(), "CPU usage alert threshold %"),
            ("cpu_temp_threshold", self.cpu_temp_threshold.to_string(), "CPU temperature alert threshold C"),
            ("packet_loss_threshold", self.packet_loss_threshold.to_string(), "Packet loss alert threshold %"),
            ("jitter_threshold", self.jitter_threshold.to_string(), "Jitter alert threshold ms"),
            ("low_disk_free_percent", self.low_disk_free_percent.to_string(), "Low disk free space threshold %"),
            ("low_battery_alerts_enabled", self.low_battery_alerts_enabled.to_string(), "Low battery alert switch"),
            ("low_battery_threshold", self.low_battery_threshold.to_string(), "Low battery alert threshold %"),
            ("battery_automation_enabled", self.battery_automation_enabled.to_string(), "Enter power-save on low battery"),
            ("battery_automation_threshold", self.battery_automation_threshold.to_string(), "Battery % that enters power-save"),
            ("battery_automation_hysteresis", self.battery_automation_hysteresis.to_string(), "Extra % above threshold required to leave power-save"),
            ("power_save_active", self.power_save_active.to_string(), "Persisted power-save state"),
            ("router_host", self.router_host.clone(), "Router probe target"),
            ("internet_host", self.internet_host.clone(), "Internet probe target"),
            ("probe_port", self.probe_port.to_string(), "TCP port used by both probes"),
            ("dns_probe_host", self.dns_probe_host.clone(), "Hostname resolved to time DNS"),
            ("dns_timeout_ms", self.dns_timeout_ms.to_string(), "DNS lookup timeout ms"),
            ("snapshot_interval_secs", self.snapshot_interval_secs.to_string(), "Metric snapshot interval seconds"),
            ("history_retention_days", self.history_retention_days.to_string(), "History retention days"),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs.to_string(), "Graceful shutdown timeout seconds"),
        ]
    }

    /// Base (normal-mode) poll interval for a monitor.
    pub fn base_interval(&self, kind: MonitorKind) -> Duration {
        let ms = match kind {
            MonitorKind::Cpu => self.poll_ms_cpu,
            MonitorKind::Memory => self.poll_ms_memory,
            MonitorKind::Network => self.poll_ms_network,
            MonitorKind::Wifi => self.poll_ms_wifi,
            MonitorKind::Disk => self.poll_ms_disk,
            MonitorKind::Processes => self.poll_ms_processes,
            MonitorKind::Battery => self.poll_ms_battery,
        };
        // a zero period would stall the monitor's ticker
        Duration::from_millis(ms.max(1))
    }

    /// Power-save (multiplier, floor) pair for a monitor.
    pub fn power_save_scaling(&self, kind: MonitorKind) -> (f64, Duration) {
        let (mult, floor_ms) = match kind {
            MonitorKind::Cpu => (self.power_save_cpu_multiplier, self.power_save_cpu_floor_ms),
            MonitorKind::Memory => (self.power_save_memory_multiplier, self.power_save_memory_floor_ms),
            MonitorKind::Network => (self.power_save_network_multiplier, self.power_save_network_floor_ms),
            MonitorKind::Wifi => (self.power_save_wifi_multiplier, self.power_save_wifi_floor_ms),
            MonitorKind::Disk => (self.power_save_disk_multiplier, self.power_save_disk_floor_ms),
            MonitorKind::Processes => (self.power_save_processes_multiplier, self.power_save_processes_floor_ms),
            MonitorKind::Battery => (self.power_save_battery_multiplier, self.power_save_battery_floor_ms),
        };
        (mult, Duration::from_millis(floor_ms))
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.alerts_cooldown_minutes.max(0.0) * 60_000.0) as i64)
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
