use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::HistorySink;
use crate::cache::{CurrentMetrics, MetricsCache};
use crate::types::MetricSnapshot;

/// Build a snapshot from the current readings. Needs cpu, memory and a
/// primary volume; battery fields stay empty on machines without one.
pub fn snapshot_from(metrics: &CurrentMetrics) -> Option<MetricSnapshot> {
    let cpu = metrics.cpu.as_ref()?;
    let memory = metrics.memory.as_ref()?;
    let volume = metrics.primary_volume()?;
    Some(MetricSnapshot {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        cpu_usage: cpu.total_usage,
        memory_used_percent: memory.used_percent(),
        memory_pressure_score: memory.pressure.score(),
        disk_free_percent: volume.free_percent(),
        battery_percent: metrics.battery.map(|b| b.charge_percent),
        battery_is_charging: metrics.battery.map(|b| b.is_charging),
    })
}

/// Write a snapshot now and then every `interval` until cancelled.
pub fn spawn(
    cache: MetricsCache,
    sink: Arc<dyn HistorySink>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match snapshot_from(&cache.snapshot()) {
                Some(snapshot) => sink.record_snapshot(snapshot),
                None => tracing::debug!("metric snapshot skipped, readings incomplete"),
            }
        }
    })
}
