use std::time::Duration;

use crate::config::LoadwatchCfg;
use crate::polling::profile::PollingProfile;
use crate::types::MonitorKind;

/// A metric monitor whose cadence is owned by the coordinator.
/// Readers for cpu, memory, disk and battery plug in through this trait.
pub trait Monitor: Send + Sync {
    fn kind(&self) -> MonitorKind;
    /// Begin polling at `interval`. Called only after `stop()`.
    fn start(&mut self, interval: Duration);
    /// Stop polling. Must be idempotent.
    fn stop(&mut self);
}

/// Owns every monitor and the active polling profile.
///
/// Profile switches are all-or-nothing: every monitor is stopped before any
/// is restarted, so two profiles are never live at once.
pub struct MonitorCoordinator {
    monitors: Vec<Box<dyn Monitor>>,
    cfg: LoadwatchCfg,
    power_save: bool,
    active: Option<PollingProfile>,
}

impl MonitorCoordinator {
    pub fn new(cfg: LoadwatchCfg) -> Self {
        let power_save = cfg.power_save_active;
        Self {
            monitors: Vec::new(),
            cfg,
            power_save,
            active: None,
        }
    }

    /// Add a monitor. It starts with the next `start_all`/`restart_all`.
    pub fn register(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    pub fn monitor_kinds(&self) -> Vec<MonitorKind> {
        self.monitors.iter().map(|m| m.kind()).collect()
    }

    /// Resolve the profile for the current mode and start every monitor.
    pub fn start_all(&mut self) {
        let profile = PollingProfile::resolve(&self.cfg, self.power_save);
        for monitor in &mut self.monitors {
            monitor.start(profile.interval(monitor.kind()));
        }
        tracing::info!(
            monitors = self.monitors.len(),
            power_save = self.power_save,
            "monitors started"
        );
        self.active = Some(profile);
    }

    pub fn stop_all(&mut self) {
        for monitor in &mut self.monitors {
            monitor.stop();
        }
        self.active = None;
    }

    pub fn restart_all(&mut self) {
        self.stop_all();
        self.start_all();
    }

    /// Flip power-save mode. No-op when already in the requested mode.
    /// Returns whether the mode changed.
    pub fn set_power_save_mode(&mut self, enabled: bool) -> bool {
        if self.power_save == enabled {
            return false;
        }
        self.power_save = enabled;
        self.cfg.power_save_active = enabled;
        tracing::info!(power_save = enabled, "power-save mode changed");
        self.restart_all();
        true
    }

    /// Replace the configuration and restart under it. A changed
    /// `power_save_active` flips the mode as well.
    pub fn apply_config(&mut self, cfg: LoadwatchCfg) {
        if cfg == self.cfg {
            return;
        }
        self.power_save = cfg.power_save_active;
        self.cfg = cfg;
        self.restart_all();
    }

    pub fn is_power_save(&self) -> bool {
        self.power_save
    }

    /// Profile currently in force, `None` while stopped.
    pub fn active_profile(&self) -> Option<&PollingProfile> {
        self.active.as_ref()
    }
}

impl Drop for MonitorCoordinator {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(MonitorKind, Duration),
        Stop(MonitorKind),
    }

    struct Recording {
        kind: MonitorKind,
        log: Arc<Mutex<Vec<Call>>>,
    }

    impl Monitor for Recording {
        fn kind(&self) -> MonitorKind {
            self.kind
        }
        fn start(&mut self, interval: Duration) {
            self.log.lock().unwrap().push(Call::Start(self.kind, interval));
        }
        fn stop(&mut self) {
            self.log.lock().unwrap().push(Call::Stop(self.kind));
        }
    }

    fn coordinator(kinds: &[MonitorKind]) -> (MonitorCoordinator, Arc<Mutex<Vec<Call>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut c = MonitorCoordinator::new(LoadwatchCfg::default());
        for &kind in kinds {
            c.register(Box::new(Recording { kind, log: log.clone() }));
        }
        (c, log)
    }

    #[test]
    fn start_all_uses_base_intervals() {
        let (mut c, log) = coordinator(&[MonitorKind::Cpu, MonitorKind::Disk]);
        c.start_all();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Call::Start(MonitorKind::Cpu, Duration::from_secs(1)),
                Call::Start(MonitorKind::Disk, Duration::from_secs(5)),
            ]
        );
        assert!(!c.active_profile().unwrap().power_save);
    }

    #[test]
    fn power_save_restarts_with_every_stop_first() {
        let (mut c, log) = coordinator(&[MonitorKind::Cpu, MonitorKind::Wifi, MonitorKind::Disk]);
        c.start_all();
        log.lock().unwrap().clear();

        assert!(c.set_power_save_mode(true));
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.len(), 6);
        assert!(calls[..3].iter().all(|c| matches!(c, Call::Stop(_))));
        assert_eq!(calls[3], Call::Start(MonitorKind::Cpu, Duration::from_secs(3)));
        assert_eq!(calls[4], Call::Start(MonitorKind::Wifi, Duration::from_secs(5)));
        assert_eq!(calls[5], Call::Start(MonitorKind::Disk, Duration::from_secs(15)));
        assert!(c.is_power_save());
    }

    #[test]
    fn same_mode_is_a_no_op() {
        let (mut c, log) = coordinator(&[MonitorKind::Battery]);
        c.start_all();
        log.lock().unwrap().clear();
        assert!(!c.set_power_save_mode(false));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn apply_config_restarts_under_new_intervals() {
        let (mut c, log) = coordinator(&[MonitorKind::Memory]);
        c.start_all();
        log.lock().unwrap().clear();

        let cfg = LoadwatchCfg { poll_ms_memory: 4000, ..LoadwatchCfg::default() };
        c.apply_config(cfg.clone());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Call::Stop(MonitorKind::Memory),
                Call::Start(MonitorKind::Memory, Duration::from_secs(4)),
            ]
        );

        log.lock().unwrap().clear();
        c.apply_config(cfg);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn mode_switch_is_reflected_in_config() {
        let (mut c, log) = coordinator(&[MonitorKind::Cpu]);
        c.start_all();
        c.set_power_save_mode(true);
        log.lock().unwrap().clear();

        // the same config with the flag already set does not restart again
        let cfg = LoadwatchCfg { power_save_active: true, ..LoadwatchCfg::default() };
        c.apply_config(cfg);
        assert!(log.lock().unwrap().is_empty());

        c.apply_config(LoadwatchCfg::default());
        assert!(!c.is_power_save());
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&Call::Start(MonitorKind::Cpu, Duration::from_secs(1)))
        );
    }
}
