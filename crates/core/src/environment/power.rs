use std::path::Path;

use crate::types::{BatteryReading, PowerSource};

/// Default sysfs root for power supplies.
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

/// Battery state from a sysfs power-supply tree. `None` on machines
/// without a battery.
pub fn read_battery(root: &Path) -> Option<BatteryReading> {
    let entries = std::fs::read_dir(root).ok()?;

    let mut battery: Option<(f64, String)> = None;
    let mut mains_online: Option<bool> = None;
    for entry in entries.flatten() {
        let dir = entry.path();
        match read_attr(&dir, "type").as_deref() {
            Some("Battery") if battery.is_none() => {
                let Some(capacity) = read_attr(&dir, "capacity").and_then(|c| c.parse().ok())
                else {
                    continue;
                };
                let status = read_attr(&dir, "status").unwrap_or_default();
                battery = Some((capacity, status));
            }
            Some("Mains") => {
                let online = read_attr(&dir, "online").is_some_and(|v| v == "1");
                mains_online = Some(mains_online.unwrap_or(false) || online);
            }
            _ => {}
        }
    }

    let (charge_percent, status) = battery?;
    Some(battery_from(charge_percent, &status, mains_online))
}

/// Combine a battery status string with the mains state, when known.
pub fn battery_from(charge_percent: f64, status: &str, mains_online: Option<bool>) -> BatteryReading {
    let is_charging = status == "Charging";
    let power_source = match mains_online {
        Some(true) => PowerSource::Ac,
        Some(false) => PowerSource::Battery,
        None if status == "Discharging" => PowerSource::Battery,
        None if is_charging || status == "Full" => PowerSource::Ac,
        None => PowerSource::Unknown,
    };
    BatteryReading {
        charge_percent: charge_percent.clamp(0.0, 100.0),
        is_charging,
        power_source,
    }
}
