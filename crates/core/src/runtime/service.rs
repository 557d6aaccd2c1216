use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::shutdown::ShutdownGuard;
use crate::alerts::{self, AlertRulesEngine, AlertRx};
use crate::cache::MetricsCache;
use crate::config::LoadwatchCfg;
use crate::environment::{BatterySampler, CpuSampler, DiskSampler, MemorySampler, SamplingMonitor};
use crate::history::{self, FanoutHistory, HistorySink, MemoryHistory, PgHistory, recorder};
use crate::network::{LinkReader, NetworkHealthMonitor};
use crate::polling::{BatteryAutomation, Monitor, MonitorCoordinator};
use crate::types::{
    BatteryReading, Category, MonitorKind, Severity, TimelineEvent, TimelineRange,
};

const ALERT_CHANNEL_CAPACITY: usize = 32;

/// Shared, observable configuration. Thresholds reach the alert engine on
/// its next tick; interval changes restart the monitors, the engine timer and
/// the battery check under the new periods.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<LoadwatchCfg>>,
}

impl ConfigHandle {
    pub fn current(&self) -> LoadwatchCfg {
        self.tx.borrow().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut LoadwatchCfg)) {
        self.tx.send_modify(f);
    }
}

/// Owns every service and drives them until shutdown.
pub struct Runtime {
    cfg: ConfigHandle,
    shutdown: ShutdownGuard,
    pool: Option<PgPool>,
    cache: MetricsCache,
    memory: Arc<MemoryHistory>,
    history: Arc<dyn HistorySink>,
    /// Database writer task and the token that ends it, when persistent.
    writer: Option<(CancellationToken, JoinHandle<()>)>,
    coordinator: MonitorCoordinator,
    alerts: AlertRulesEngine,
    automation: BatteryAutomation,
}

impl Runtime {
    /// Create a new Runtime. Returns (Runtime, alert_receiver).
    /// Must be called inside a tokio runtime when `pool` is set.
    pub fn new(
        cfg: LoadwatchCfg,
        pool: Option<PgPool>,
        link: Arc<dyn LinkReader>,
    ) -> (Self, AlertRx) {
        let shutdown = ShutdownGuard::new();
        let token = shutdown.token();
        let cache = MetricsCache::new();

        let memory = Arc::new(MemoryHistory::with_retention(chrono::Duration::days(
            cfg.history_retention_days,
        )));
        let mut fanout = FanoutHistory::new(vec![memory.clone() as Arc<dyn HistorySink>]);
        let writer = pool.as_ref().map(|pool| {
            // outlives the shutdown token so the final events still land
            let writer_token = CancellationToken::new();
            let (sink, handle) =
                PgHistory::spawn(pool.clone(), cfg.history_retention_days, writer_token.clone());
            fanout.push(Arc::new(sink));
            (writer_token, handle)
        });
        let history: Arc<dyn HistorySink> = Arc::new(fanout);

        let mut coordinator = MonitorCoordinator::new(cfg.clone());
        coordinator.register(Box::new(NetworkHealthMonitor::new(
            &cfg,
            link,
            cache.clone(),
            token.clone(),
        )));

        let (cfg_tx, cfg_rx) = watch::channel(cfg);
        let (alert_tx, alert_rx) = alerts::channel(ALERT_CHANNEL_CAPACITY);
        let alerts = AlertRulesEngine::new(cache.clone(), cfg_rx, history.clone(), alert_tx, token);

        let runtime = Self {
            cfg: ConfigHandle { tx: Arc::new(cfg_tx) },
            shutdown,
            pool,
            cache,
            memory,
            history,
            writer,
            coordinator,
            alerts,
            automation: BatteryAutomation::new(),
        };
        (runtime, alert_rx)
    }

    /// Register the cpu, memory, disk and battery readers of this host.
    pub fn register_host_samplers(&mut self) {
        let token = self.shutdown.token();
        self.register(Box::new(SamplingMonitor::new(CpuSampler::new(), self.cache.clone(), token.clone())));
        self.register(Box::new(SamplingMonitor::new(MemorySampler, self.cache.clone(), token.clone())));
        self.register(Box::new(SamplingMonitor::new(DiskSampler::default(), self.cache.clone(), token.clone())));
        self.register(Box::new(SamplingMonitor::new(BatterySampler::default(), self.cache.clone(), token)));
    }

    /// Add a monitor. Register before `run()`.
    pub fn register(&mut self, monitor: Box<dyn Monitor>) {
        self.coordinator.register(monitor);
    }

    /// Start every service, then serve config changes and battery
    /// automation until shutdown. Returns when shutdown is complete.
    pub async fn run(&mut self) {
        self.shutdown.spawn_signal_listener();
        let token = self.shutdown.token();
        let cfg = self.cfg.current();

        if let Some(pool) = self.pool.clone() {
            self.restore_history(&pool).await;
        }

        let kinds = self.coordinator.monitor_kinds();
        tracing::info!(monitors = ?kinds, "loadwatch runtime started");
        self.history.record_event(TimelineEvent::new(
            Severity::Info,
            Category::System,
            "Monitoring Started",
            format!("{} monitors active.", kinds.len()),
        ));

        self.coordinator.start_all();
        self.alerts.start();
        let recorder = recorder::spawn(
            self.cache.clone(),
            Arc::clone(&self.history),
            Duration::from_secs(cfg.snapshot_interval_secs.max(1)),
            token.child_token(),
        );

        let mut cfg_rx = self.cfg.tx.subscribe();
        let mut applied = cfg;
        let mut battery_tick = battery_ticker(&applied);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("shutdown signal received, stopping monitors");
                    break;
                }
                changed = cfg_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let cfg = cfg_rx.borrow_and_update().clone();
                    if cfg.alert_tick_secs != applied.alert_tick_secs {
                        self.alerts.start();
                    }
                    if cfg.poll_ms_battery != applied.poll_ms_battery {
                        battery_tick = battery_ticker(&cfg);
                    }
                    applied = cfg.clone();
                    self.coordinator.apply_config(cfg);
                }
                _ = battery_tick.tick() => self.check_battery().await,
            }
        }

        self.alerts.stop();
        self.coordinator.stop_all();
        token.cancel();
        let _ = recorder.await;

        self.history.record_event(TimelineEvent::new(
            Severity::Info,
            Category::System,
            "Monitoring Stopped",
            "Shutdown requested.",
        ));
        if let Some((writer_token, handle)) = self.writer.take() {
            writer_token.cancel();
            let timeout = Duration::from_secs(self.cfg.current().shutdown_timeout_secs);
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!(timeout_secs = timeout.as_secs(), "history writer did not finish in time");
            }
        }
        tracing::info!("loadwatch runtime stopped");
    }

    /// Returns the cancellation token for spawning child tasks.
    pub fn token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    pub fn config(&self) -> ConfigHandle {
        self.cfg.clone()
    }

    pub fn cache(&self) -> MetricsCache {
        self.cache.clone()
    }

    /// In-memory history, restored from the database at startup when present.
    pub fn history(&self) -> Arc<MemoryHistory> {
        Arc::clone(&self.memory)
    }

    async fn check_battery(&mut self) {
        let cfg = self.cfg.current();
        let battery = self.cache.battery();
        let Some(enable) =
            self.automation
                .evaluate(self.coordinator.is_power_save(), battery.as_ref(), &cfg)
        else {
            return;
        };
        self.set_power_save(enable, battery).await;
    }

    /// Flip power-save, record it, publish it and persist it.
    async fn set_power_save(&mut self, enabled: bool, battery: Option<BatteryReading>) {
        if !self.coordinator.set_power_save_mode(enabled) {
            return;
        }
        let charge = battery
            .map(|b| format!("{:.0}%", b.charge_percent))
            .unwrap_or_else(|| "unknown".to_string());
        let (title, message) = if enabled {
            ("Power Save Enabled", format!("Battery at {charge}. Polling slowed to save power."))
        } else {
            ("Power Save Disabled", format!("Battery at {charge}. Normal polling resumed."))
        };
        self.history.record_event(TimelineEvent::new(
            Severity::Info,
            Category::Battery,
            title,
            message,
        ));
        self.cfg.update(|c| c.power_save_active = enabled);

        if let Some(pool) = &self.pool {
            if let Err(e) =
                LoadwatchCfg::store_value(pool, "power_save_active", &enabled.to_string()).await
            {
                tracing::warn!(error = %e, "failed to persist power-save state");
            }
        }
    }

    async fn restore_history(&self, pool: &PgPool) {
        let since = Utc::now() - TimelineRange::Last7d.duration();
        match history::db::fetch_events_since(pool, since).await {
            Ok(events) => {
                tracing::info!(count = events.len(), "timeline restored");
                for event in events.into_iter().rev() {
                    self.memory.record_event(event);
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to restore timeline"),
        }
        match history::db::fetch_snapshots_since(pool, since).await {
            Ok(snapshots) => {
                tracing::info!(count = snapshots.len(), "metric snapshots restored");
                for snapshot in snapshots.into_iter().rev() {
                    self.memory.record_snapshot(snapshot);
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to restore metric snapshots"),
        }
    }
}

/// Automation check at the battery monitor's base period, at least 1 s.
fn battery_ticker(cfg: &LoadwatchCfg) -> tokio::time::Interval {
    let period = cfg.base_interval(MonitorKind::Battery).max(Duration::from_secs(1));
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tick
}
