use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::MetricsCache;
use crate::environment::{power, system};
use crate::polling::Monitor;
use crate::types::MonitorKind;

const MIN_TICK: Duration = Duration::from_millis(1);

/// One synchronous read of a metric into the cache.
pub trait Sampler: Send + 'static {
    fn kind(&self) -> MonitorKind;
    fn sample(&mut self, cache: &MetricsCache);
}

/// Runs a [`Sampler`] on an interval as a coordinator-managed [`Monitor`].
pub struct SamplingMonitor<S> {
    kind: MonitorKind,
    sampler: Arc<Mutex<S>>,
    cache: MetricsCache,
    parent: CancellationToken,
    running: Option<CancellationToken>,
}

impl<S: Sampler> SamplingMonitor<S> {
    pub fn new(sampler: S, cache: MetricsCache, parent: CancellationToken) -> Self {
        Self {
            kind: sampler.kind(),
            sampler: Arc::new(Mutex::new(sampler)),
            cache,
            parent,
            running: None,
        }
    }
}

impl<S: Sampler> Monitor for SamplingMonitor<S> {
    fn kind(&self) -> MonitorKind {
        self.kind
    }

    fn start(&mut self, interval: Duration) {
        self.stop();
        let token = self.parent.child_token();
        let cancel = token.clone();
        let sampler = Arc::clone(&self.sampler);
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let mut guard = sampler.lock().unwrap_or_else(|e| e.into_inner());
                if cancel.is_cancelled() {
                    return;
                }
                guard.sample(&cache);
            }
        });

        tracing::debug!(monitor = %self.kind, interval_ms = interval.as_millis() as u64, "sampler started");
        self.running = Some(token);
    }

    fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

impl<S> Drop for SamplingMonitor<S> {
    fn drop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

// ── Host samplers ───────────────────────────────────────────────

impl Sampler for system::CpuSampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Cpu
    }

    fn sample(&mut self, cache: &MetricsCache) {
        cache.set_cpu(self.read());
    }
}

#[derive(Debug, Default)]
pub struct MemorySampler;

impl Sampler for MemorySampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Memory
    }

    fn sample(&mut self, cache: &MetricsCache) {
        cache.set_memory(system::read_memory());
    }
}

/// Samples a fixed list of mounts; the first one is the primary volume.
#[derive(Debug)]
pub struct DiskSampler {
    mounts: Vec<(String, PathBuf)>,
}

impl DiskSampler {
    pub fn new(mounts: Vec<(String, PathBuf)>) -> Self {
        Self { mounts }
    }
}

impl Default for DiskSampler {
    fn default() -> Self {
        Self::new(vec![("root".to_string(), PathBuf::from("/"))])
    }
}

impl Sampler for DiskSampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Disk
    }

    fn sample(&mut self, cache: &MetricsCache) {
        let volumes = self
            .mounts
            .iter()
            .filter_map(|(name, path)| system::read_volume(name, path))
            .collect();
        cache.set_volumes(volumes);
    }
}

#[derive(Debug)]
pub struct BatterySampler {
    root: PathBuf,
}

impl BatterySampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for BatterySampler {
    fn default() -> Self {
        Self::new(power::POWER_SUPPLY_ROOT)
    }
}

impl Sampler for BatterySampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Battery
    }

    fn sample(&mut self, cache: &MetricsCache) {
        cache.set_battery(power::read_battery(&self.root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CpuReading;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl Sampler for Counting {
        fn kind(&self) -> MonitorKind {
            MonitorKind::Cpu
        }
        fn sample(&mut self, cache: &MetricsCache) {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            cache.set_cpu(Some(CpuReading { total_usage: n as f64, temperature: None }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_on_interval_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let cache = MetricsCache::new();
        let mut monitor =
            SamplingMonitor::new(Counting(count.clone()), cache.clone(), CancellationToken::new());
        assert_eq!(monitor.kind(), MonitorKind::Cpu);

        monitor.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(cache.snapshot().cpu.map(|c| c.total_usage), Some(3.0));

        monitor.stop();
        monitor.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_one_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut monitor =
            SamplingMonitor::new(Counting(count.clone()), MetricsCache::new(), CancellationToken::new());
        monitor.start(Duration::from_secs(1));
        monitor.start(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        // only the second loop runs: its immediate first tick
        assert_eq!(count.load(Ordering::SeqCst), 1);
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_samples() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut monitor =
            SamplingMonitor::new(Counting(count.clone()), MetricsCache::new(), CancellationToken::new());
        monitor.start(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);
        monitor.stop();
    }

    #[tokio::test]
    async fn disk_sampler_reads_primary_volume() {
        let cache = MetricsCache::new();
        DiskSampler::default().sample(&cache);
        #[cfg(unix)]
        assert_eq!(cache.snapshot().primary_volume().map(|v| v.name.as_str()), Some("root"));
    }
}
