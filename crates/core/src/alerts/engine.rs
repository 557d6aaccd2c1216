use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::alerts::rules::{AlertRule, is_quiet_hour};
use crate::cache::{CurrentMetrics, MetricsCache};
use crate::config::LoadwatchCfg;
use crate::history::HistorySink;
use crate::types::{Category, IncidentType, MemoryPressure, Severity, TimelineEvent};

/// A presented alert. The host decides how to show it.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Alert channel sender. Delivery is best-effort: a full channel drops.
pub type AlertTx = mpsc::Sender<Alert>;
/// Alert channel receiver, held by the host.
pub type AlertRx = mpsc::Receiver<Alert>;

/// Create an alert channel with the given buffer size.
pub fn channel(buffer: usize) -> (AlertTx, AlertRx) {
    mpsc::channel(buffer)
}

#[derive(Debug, Default)]
struct EngineState {
    last_triggered_at: HashMap<AlertRule, DateTime<Utc>>,
    last_incident: Option<IncidentType>,
    last_presented_at: Option<DateTime<Utc>>,
}

struct EngineInner {
    cache: MetricsCache,
    cfg: watch::Receiver<LoadwatchCfg>,
    history: Arc<dyn HistorySink>,
    alerts: AlertTx,
    state: Mutex<EngineState>,
}

/// Periodic evaluator over the metrics cache.
///
/// Every evaluation holds the state lock for its whole run, so two ticks
/// never interleave.
pub struct AlertRulesEngine {
    inner: Arc<EngineInner>,
    running: Option<CancellationToken>,
    parent: CancellationToken,
}

impl AlertRulesEngine {
    pub fn new(
        cache: MetricsCache,
        cfg: watch::Receiver<LoadwatchCfg>,
        history: Arc<dyn HistorySink>,
        alerts: AlertTx,
        parent: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                cache,
                cfg,
                history,
                alerts,
                state: Mutex::new(EngineState::default()),
            }),
            running: None,
            parent,
        }
    }

    /// Evaluate now, then every `alert_tick_secs` until stopped.
    pub fn start(&mut self) {
        self.stop();
        let token = self.parent.child_token();
        let cancel = token.clone();
        let inner = Arc::clone(&self.inner);
        let period = Duration::from_secs(inner.cfg.borrow().alert_tick_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = inner.evaluate(Local::now()) => {}
                }
            }
        });

        tracing::info!(tick_secs = period.as_secs(), "alert engine started");
        self.running = Some(token);
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
            tracing::info!("alert engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Run one evaluation as of `now`.
    pub async fn evaluate_at(&self, now: DateTime<Local>) {
        self.inner.evaluate(now).await;
    }
}

impl Drop for AlertRulesEngine {
    fn drop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

impl EngineInner {
    async fn evaluate(&self, now: DateTime<Local>) {
        let mut state = self.state.lock().await;
        let cfg = self.cfg.borrow().clone();
        let metrics = self.cache.snapshot();

        // incident transitions are tracked even with alerts switched off
        self.track_incident(&mut state, &metrics, &cfg, now);
        if !cfg.alerts_enabled {
            return;
        }

        if let Some(cpu) = metrics.cpu {
            if cpu.total_usage >= cfg.cpu_usage_threshold {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::CpuUsageHigh,
                    Severity::Warning,
                    "High CPU Usage",
                    format!("CPU usage is {:.0}%.", cpu.total_usage),
                );
            }
            if let Some(temp) = cpu.temperature.filter(|t| *t >= cfg.cpu_temp_threshold) {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::CpuTempHigh,
                    Severity::Critical,
                    "High CPU Temperature",
                    format!("CPU temperature is {temp:.0}°C."),
                );
            }
        }

        if metrics.memory.is_some_and(|m| m.pressure == MemoryPressure::Critical) {
            self.trigger(
                &mut state,
                &cfg,
                now,
                AlertRule::MemoryPressure,
                Severity::Critical,
                "Critical Memory Pressure",
                "Memory pressure is critical. Close heavy apps.".to_string(),
            );
        }

        if let Some(network) = &metrics.network {
            let loss = network.worst_loss();
            if loss >= cfg.packet_loss_threshold {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::PacketLoss,
                    Severity::Warning,
                    "Packet Loss Detected",
                    format!("Packet loss is {loss:.1}%."),
                );
            }
            let jitter = network.worst_jitter();
            if jitter >= cfg.jitter_threshold {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::HighJitter,
                    Severity::Warning,
                    "High Jitter Detected",
                    format!("Jitter is {jitter:.0} ms."),
                );
            }
        }

        if let Some(volume) = metrics.primary_volume() {
            let free = volume.free_percent();
            if free <= cfg.low_disk_free_percent {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::LowDisk,
                    Severity::Critical,
                    "Low Disk Space",
                    format!("{} has {free:.1}% free space.", volume.name),
                );
            }
        }

        if cfg.low_battery_alerts_enabled {
            if let Some(battery) = metrics
                .battery
                .filter(|b| b.is_discharging() && b.charge_percent <= cfg.low_battery_threshold)
            {
                self.trigger(
                    &mut state,
                    &cfg,
                    now,
                    AlertRule::LowBattery,
                    Severity::Critical,
                    "Low Battery",
                    format!("Battery is at {:.0}%.", battery.charge_percent),
                );
            }
        }
    }

    fn track_incident(
        &self,
        state: &mut EngineState,
        metrics: &CurrentMetrics,
        cfg: &LoadwatchCfg,
        now: DateTime<Local>,
    ) {
        let incident = metrics.network.as_ref().and_then(|n| n.incident);
        let kind = incident.map(|i| i.kind);
        if kind == state.last_incident {
            return;
        }
        let at = now.with_timezone(&Utc);

        match incident {
            Some(incident) => {
                tracing::info!(incident = ?incident.kind, "network incident detected");
                self.history.record_event(TimelineEvent::at(
                    at,
                    Severity::Warning,
                    Category::Network,
                    incident.title,
                    incident.hint,
                ));
                self.trigger(
                    state,
                    cfg,
                    now,
                    AlertRule::NetworkIncident,
                    Severity::Warning,
                    incident.title,
                    incident.hint.to_string(),
                );
            }
            None => {
                tracing::info!("network recovered");
                self.history.record_event(TimelineEvent::at(
                    at,
                    Severity::Info,
                    Category::Network,
                    "Network Recovered",
                    "Connectivity checks are back to normal.",
                ));
            }
        }
        state.last_incident = kind;
    }

    /// Cooldown gate, then record, then quiet hours and debounce before
    /// presenting.
    #[allow(clippy::too_many_arguments)]
    fn trigger(
        &self,
        state: &mut EngineState,
        cfg: &LoadwatchCfg,
        now: DateTime<Local>,
        rule: AlertRule,
        severity: Severity,
        title: &str,
        message: String,
    ) {
        let at = now.with_timezone(&Utc);
        if let Some(last) = state.last_triggered_at.get(&rule) {
            if at - *last < cfg.cooldown() {
                return;
            }
        }
        state.last_triggered_at.insert(rule, at);
        self.history.record_event(TimelineEvent::at(
            at,
            severity,
            rule.category(),
            title,
            message.clone(),
        ));

        if cfg.quiet_hours_enabled
            && is_quiet_hour(now.hour(), cfg.quiet_hours_start, cfg.quiet_hours_end)
        {
            tracing::debug!(rule = rule.as_str(), "alert suppressed by quiet hours");
            return;
        }
        let debounce = chrono::Duration::seconds(cfg.alert_debounce_secs as i64);
        if let Some(last) = state.last_presented_at {
            if at - last < debounce {
                tracing::debug!(rule = rule.as_str(), "alert debounced");
                return;
            }
        }
        state.last_presented_at = Some(at);

        tracing::info!(rule = rule.as_str(), severity = ?severity, title, "alert presented");
        let alert = Alert {
            severity,
            title: title.to_string(),
            message,
        };
        if self.alerts.try_send(alert).is_err() {
            tracing::warn!(rule = rule.as_str(), "alert channel full, alert dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::types::{
        BatteryReading, CpuReading, MemoryReading, NetworkHealthSnapshot, PowerSource,
        TimelineRange, VolumeReading,
    };

    struct Harness {
        engine: AlertRulesEngine,
        cache: MetricsCache,
        history: Arc<MemoryHistory>,
        alerts: AlertRx,
        cfg: watch::Sender<LoadwatchCfg>,
    }

    impl Harness {
        fn new(cfg: LoadwatchCfg) -> Self {
            let cache = MetricsCache::new();
            let history = Arc::new(MemoryHistory::new());
            let (alert_tx, alerts) = channel(16);
            let (cfg, cfg_rx) = watch::channel(cfg);
            let engine = AlertRulesEngine::new(
                cache.clone(),
                cfg_rx,
                history.clone(),
                alert_tx,
                CancellationToken::new(),
            );
            Self { engine, cache, history, alerts, cfg }
        }

        fn titles(&self) -> Vec<String> {
            self.history
                .events_in(TimelineRange::Last24h)
                .into_iter()
                .rev()
                .map(|e| e.title)
                .collect()
        }

        fn drain(&mut self) -> Vec<Alert> {
            let mut out = Vec::new();
            while let Ok(alert) = self.alerts.try_recv() {
                out.push(alert);
            }
            out
        }
    }

    fn hot_cpu() -> Option<CpuReading> {
        Some(CpuReading { total_usage: 95.0, temperature: None })
    }

    fn snapshot_with(kind: Option<IncidentType>) -> Option<NetworkHealthSnapshot> {
        Some(NetworkHealthSnapshot {
            timestamp: Utc::now(),
            incident: kind.map(IncidentType::incident),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn cpu_alert_then_second_tick_is_quiet() {
        let mut h = Harness::new(LoadwatchCfg::default());
        h.cache.set_cpu(hot_cpu());
        let t0 = Local::now();

        h.engine.evaluate_at(t0).await;
        let alerts = h.drain();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "High CPU Usage");
        assert_eq!(alerts[0].message, "CPU usage is 95%.");
        assert_eq!(alerts[0].severity, Severity::Warning);

        h.engine.evaluate_at(t0 + chrono::Duration::seconds(15)).await;
        assert!(h.drain().is_empty());
        assert_eq!(h.titles(), vec!["High CPU Usage"]);
    }

    #[tokio::test]
    async fn cooldown_rearms_after_window() {
        let mut h = Harness::new(LoadwatchCfg::default());
        h.cache.set_cpu(hot_cpu());
        let t0 = Local::now();

        h.engine.evaluate_at(t0).await;
        h.engine.evaluate_at(t0 + chrono::Duration::minutes(5)).await;
        assert_eq!(h.drain().len(), 1);
        assert_eq!(h.titles().len(), 1);

        h.engine.evaluate_at(t0 + chrono::Duration::minutes(11)).await;
        assert_eq!(h.drain().len(), 1);
        assert_eq!(h.titles().len(), 2);
    }

    #[tokio::test]
    async fn same_tick_rules_share_one_presentation() {
        let mut h = Harness::new(LoadwatchCfg::default());
        h.cache.set_cpu(hot_cpu());
        h.cache.set_memory(Some(MemoryReading {
            used: 1,
            wired: 1,
            total: 2,
            pressure: MemoryPressure::Critical,
        }));
        let t0 = Local::now();

        h.engine.evaluate_at(t0).await;
        assert_eq!(h.titles(), vec!["High CPU Usage", "Critical Memory Pressure"]);
        assert_eq!(h.drain().len(), 1);

        // a new rule after the debounce window is presented
        h.cache.set_volumes(vec![VolumeReading { name: "root".into(), total: 100, free: 5 }]);
        h.engine.evaluate_at(t0 + chrono::Duration::seconds(6)).await;
        let alerts = h.drain();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "root has 5.0% free space.");
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn quiet_hours_record_without_presenting() {
        let cfg = LoadwatchCfg {
            quiet_hours_enabled: true,
            quiet_hours_start: 9,
            quiet_hours_end: 9,
            ..LoadwatchCfg::default()
        };
        let mut h = Harness::new(cfg);
        h.cache.set_cpu(hot_cpu());
        h.engine.evaluate_at(Local::now()).await;
        assert_eq!(h.titles(), vec!["High CPU Usage"]);
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn disabled_alerts_still_track_incidents() {
        let cfg = LoadwatchCfg { alerts_enabled: false, ..LoadwatchCfg::default() };
        let mut h = Harness::new(cfg);
        h.cache.set_cpu(hot_cpu());
        h.cache.set_network(snapshot_with(Some(IncidentType::GatewayUnreachable)));
        h.engine.evaluate_at(Local::now()).await;

        // incident event plus the network_incident rule event, no cpu rule
        assert_eq!(h.titles(), vec!["Gateway Unreachable", "Gateway Unreachable"]);
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test]
    async fn incident_onset_and_recovery() {
        let mut h = Harness::new(LoadwatchCfg::default());
        let t0 = Local::now();

        h.cache.set_network(snapshot_with(Some(IncidentType::DnsFailure)));
        h.engine.evaluate_at(t0).await;
        h.engine.evaluate_at(t0 + chrono::Duration::seconds(15)).await;
        assert_eq!(h.titles().len(), 2);

        h.cache.set_network(snapshot_with(None));
        h.engine.evaluate_at(t0 + chrono::Duration::seconds(30)).await;
        let events = h.history.events_in(TimelineRange::Last24h);
        assert_eq!(events[0].title, "Network Recovered");
        assert_eq!(events[0].severity, Severity::Info);
        assert_eq!(events[0].category, Category::Network);

        // recovery itself is never presented
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test]
    async fn no_network_snapshot_is_not_a_recovery() {
        let h = Harness::new(LoadwatchCfg::default());
        h.engine.evaluate_at(Local::now()).await;
        assert!(h.titles().is_empty());
    }

    #[tokio::test]
    async fn low_battery_respects_toggle_and_power_source() {
        let mut h = Harness::new(LoadwatchCfg::default());
        let low = BatteryReading { charge_percent: 12.0, is_charging: false, power_source: PowerSource::Battery };
        h.cache.set_battery(Some(BatteryReading { power_source: PowerSource::Ac, ..low }));
        h.engine.evaluate_at(Local::now()).await;
        assert!(h.titles().is_empty());

        h.cfg.send_modify(|c| c.low_battery_alerts_enabled = false);
        h.cache.set_battery(Some(low));
        h.engine.evaluate_at(Local::now()).await;
        assert!(h.titles().is_empty());

        h.cfg.send_modify(|c| c.low_battery_alerts_enabled = true);
        h.engine.evaluate_at(Local::now()).await;
        let alerts = h.drain();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Battery is at 12%.");
    }

    #[tokio::test]
    async fn missing_inputs_skip_their_rules() {
        let mut h = Harness::new(LoadwatchCfg::default());
        h.cache.set_cpu(Some(CpuReading { total_usage: 10.0, temperature: None }));
        h.cache.set_network(Some(NetworkHealthSnapshot::default()));
        h.engine.evaluate_at(Local::now()).await;
        assert!(h.titles().is_empty());
        assert!(h.drain().is_empty());
    }

    fn cpu_events(h: &Harness) -> usize {
        h.titles().iter().filter(|t| *t == "High CPU Usage").count()
    }

    #[tokio::test]
    async fn overlapping_evaluations_fire_once() {
        let mut h = Harness::new(LoadwatchCfg { alert_debounce_secs: 0, ..LoadwatchCfg::default() });
        h.cache.set_cpu(hot_cpu());
        let now = Local::now();

        tokio::join!(h.engine.evaluate_at(now), h.engine.evaluate_at(now));

        assert_eq!(cpu_events(&h), 1);
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test]
    async fn threshold_updates_apply_on_next_evaluation() {
        let mut h = Harness::new(LoadwatchCfg { cpu_usage_threshold: 99.0, ..LoadwatchCfg::default() });
        h.cache.set_cpu(hot_cpu());
        let t0 = Local::now();
        h.engine.evaluate_at(t0).await;
        assert_eq!(cpu_events(&h), 0);

        h.cfg.send_modify(|c| c.cpu_usage_threshold = 90.0);
        h.engine.evaluate_at(t0 + chrono::Duration::seconds(15)).await;
        assert_eq!(cpu_events(&h), 1);
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_applies_new_tick_period() {
        let mut h = Harness::new(LoadwatchCfg {
            alert_tick_secs: 60,
            alerts_cooldown_minutes: 0.0,
            alert_debounce_secs: 0,
            ..LoadwatchCfg::default()
        });
        h.cache.set_cpu(hot_cpu());
        h.engine.start();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(cpu_events(&h), 1);

        h.cfg.send_modify(|c| c.alert_tick_secs = 1);
        h.engine.start();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        // immediate tick, then one per second
        assert_eq!(cpu_events(&h), 5);
        h.engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn start_evaluates_immediately_and_stop_is_idempotent() {
        let mut h = Harness::new(LoadwatchCfg::default());
        h.cache.set_cpu(hot_cpu());
        h.engine.start();
        assert!(h.engine.is_running());

        let alert = tokio::time::timeout(Duration::from_secs(1), h.alerts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.title, "High CPU Usage");

        h.engine.stop();
        h.engine.stop();
        assert!(!h.engine.is_running());
    }
}
