use crate::config::LoadwatchCfg;
use crate::types::BatteryReading;

/// Battery-driven power-save switching with hysteresis.
///
/// Enters power-save when discharging at or below the threshold. Leaves it
/// only when power returns or charge climbs to threshold + hysteresis, and
/// only if this automation was the one that entered it.
#[derive(Debug, Default)]
pub struct BatteryAutomation {
    engaged: bool,
}

impl BatteryAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the power-save mode to switch to, or `None` to leave it as is.
    pub fn evaluate(
        &mut self,
        power_save_active: bool,
        battery: Option<&BatteryReading>,
        cfg: &LoadwatchCfg,
    ) -> Option<bool> {
        if !cfg.battery_automation_enabled {
            return None;
        }
        let battery = battery?;
        let threshold = cfg.battery_automation_threshold;

        if !power_save_active {
            // a manual exit ends our ownership
            self.engaged = false;
            if battery.is_discharging() && battery.charge_percent <= threshold {
                self.engaged = true;
                return Some(true);
            }
            return None;
        }

        if !self.engaged {
            return None;
        }
        let recovered = !battery.is_discharging()
            || battery.charge_percent >= threshold + cfg.battery_automation_hysteresis;
        if recovered {
            self.engaged = false;
            return Some(false);
        }
        None
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PowerSource;

    fn on_battery(charge: f64) -> BatteryReading {
        BatteryReading { charge_percent: charge, is_charging: false, power_source: PowerSource::Battery }
    }

    #[test]
    fn enters_at_threshold() {
        let cfg = LoadwatchCfg::default();
        let mut a = BatteryAutomation::new();
        assert_eq!(a.evaluate(false, Some(&on_battery(21.0)), &cfg), None);
        assert_eq!(a.evaluate(false, Some(&on_battery(20.0)), &cfg), Some(true));
        assert!(a.is_engaged());
    }

    #[test]
    fn stays_until_threshold_plus_hysteresis() {
        let cfg = LoadwatchCfg::default();
        let mut a = BatteryAutomation::new();
        a.evaluate(false, Some(&on_battery(18.0)), &cfg);
        assert_eq!(a.evaluate(true, Some(&on_battery(22.0)), &cfg), None);
        assert_eq!(a.evaluate(true, Some(&on_battery(24.9)), &cfg), None);
        assert_eq!(a.evaluate(true, Some(&on_battery(25.0)), &cfg), Some(false));
    }

    #[test]
    fn leaves_when_plugged_in() {
        let cfg = LoadwatchCfg::default();
        let mut a = BatteryAutomation::new();
        a.evaluate(false, Some(&on_battery(10.0)), &cfg);
        let charging = BatteryReading { charge_percent: 10.0, is_charging: true, power_source: PowerSource::Ac };
        assert_eq!(a.evaluate(true, Some(&charging), &cfg), Some(false));
    }

    #[test]
    fn manual_power_save_is_left_alone() {
        let cfg = LoadwatchCfg::default();
        let mut a = BatteryAutomation::new();
        let charging = BatteryReading { charge_percent: 90.0, is_charging: true, power_source: PowerSource::Ac };
        assert_eq!(a.evaluate(true, Some(&charging), &cfg), None);
    }

    #[test]
    fn disabled_or_unknown_battery_does_nothing() {
        let cfg = LoadwatchCfg { battery_automation_enabled: false, ..LoadwatchCfg::default() };
        let mut a = BatteryAutomation::new();
        assert_eq!(a.evaluate(false, Some(&on_battery(5.0)), &cfg), None);
        let cfg = LoadwatchCfg::default();
        assert_eq!(a.evaluate(false, None, &cfg), None);
    }
}
