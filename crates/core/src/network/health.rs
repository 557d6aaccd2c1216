use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cache::MetricsCache;
use crate::config::LoadwatchCfg;
use crate::network::incident;
use crate::polling::Monitor;
use crate::probe::{PingEngine, ProbeReader, ProbeTarget};
use crate::types::{Band, MonitorKind, NetworkHealthSnapshot};

const MIN_TICK: Duration = Duration::from_millis(1);

/// Link and radio attributes read from the OS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkAttributes {
    pub ssid: Option<String>,
    pub router_ip: Option<String>,
    pub band: Option<Band>,
    pub link_rate_mbps: Option<f64>,
    pub signal_dbm: Option<i32>,
    pub noise_dbm: Option<i32>,
    pub dns_server: Option<String>,
}

/// Source of link/radio attributes (Wi-Fi driver, netlink, ...).
pub trait LinkReader: Send + Sync {
    fn read(&self) -> LinkAttributes;
}

/// Reader for hosts without a radio: every attribute is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRadio;

impl LinkReader for NoRadio {
    fn read(&self) -> LinkAttributes {
        LinkAttributes::default()
    }
}

/// Fixed attributes, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticLink(pub LinkAttributes);

impl LinkReader for StaticLink {
    fn read(&self) -> LinkAttributes {
        self.0.clone()
    }
}

/// Assemble one snapshot from the link, both probes and the DNS timing.
///
/// Loss is reported only once a probe has attempted at least one round, and
/// classification waits until both probes have, so a fresh start does not
/// look like an outage.
pub fn build_snapshot(
    link: LinkAttributes,
    router: &ProbeReader,
    internet: &ProbeReader,
    dns_lookup_ms: Option<f64>,
) -> NetworkHealthSnapshot {
    let measured = |p: &ProbeReader| (p.attempts() > 0).then(|| p.packet_loss());

    let mut snapshot = NetworkHealthSnapshot {
        timestamp: Utc::now(),
        ssid: link.ssid,
        router_ip: link.router_ip,
        band: link.band,
        link_rate_mbps: link.link_rate_mbps,
        signal_dbm: link.signal_dbm,
        noise_dbm: link.noise_dbm,
        router_ping: router.current_ping(),
        router_jitter: router.jitter(),
        router_loss: measured(router),
        internet_ping: internet.current_ping(),
        internet_jitter: internet.jitter(),
        internet_loss: measured(internet),
        dns_lookup_ms,
        dns_server: link.dns_server,
        incident: None,
    };
    if router.attempts() > 0 && internet.attempts() > 0 {
        snapshot.incident = incident::detect(&snapshot);
    }
    snapshot
}

/// Time one resolution of `host`. Failure or timeout reads as `None`.
pub async fn measure_dns(host: &str, timeout: Duration) -> Option<f64> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .map(|_| started.elapsed().as_secs_f64() * 1000.0),
        Ok(Err(e)) => {
            tracing::debug!(host, error = %e, "dns lookup failed");
            None
        }
        Err(_) => {
            tracing::debug!(host, "dns lookup timed out");
            None
        }
    }
}

/// Produces a [`NetworkHealthSnapshot`] per tick into the metrics cache.
///
/// Owns the router and internet probes; they run while the monitor runs.
pub struct NetworkHealthMonitor {
    router: PingEngine,
    internet: PingEngine,
    link: Arc<dyn LinkReader>,
    dns_host: String,
    dns_timeout: Duration,
    cache: MetricsCache,
    running: Option<CancellationToken>,
    parent: CancellationToken,
}

impl NetworkHealthMonitor {
    pub fn new(
        cfg: &LoadwatchCfg,
        link: Arc<dyn LinkReader>,
        cache: MetricsCache,
        parent: CancellationToken,
    ) -> Self {
        Self::with_probes(
            PingEngine::new(ProbeTarget::new(cfg.router_host.clone(), cfg.probe_port)),
            PingEngine::new(ProbeTarget::new(cfg.internet_host.clone(), cfg.probe_port)),
            link,
            cfg.dns_probe_host.clone(),
            Duration::from_millis(cfg.dns_timeout_ms),
            cache,
            parent,
        )
    }

    pub fn with_probes(
        router: PingEngine,
        internet: PingEngine,
        link: Arc<dyn LinkReader>,
        dns_host: String,
        dns_timeout: Duration,
        cache: MetricsCache,
        parent: CancellationToken,
    ) -> Self {
        Self {
            router,
            internet,
            link,
            dns_host,
            dns_timeout,
            cache,
            running: None,
            parent,
        }
    }

    pub fn router(&self) -> ProbeReader {
        self.router.reader()
    }

    pub fn internet(&self) -> ProbeReader {
        self.internet.reader()
    }
}

impl Monitor for NetworkHealthMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Wifi
    }

    fn start(&mut self, interval: Duration) {
        self.stop();
        let token = self.parent.child_token();
        self.router.start(&token);
        self.internet.start(&token);

        let router = self.router.reader();
        let internet = self.internet.reader();
        let link = Arc::clone(&self.link);
        let dns_host = self.dns_host.clone();
        let dns_timeout = self.dns_timeout;
        let cache = self.cache.clone();
        let cancel = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let dns_ms = tokio::select! {
                    _ = cancel.cancelled() => return,
                    ms = measure_dns(&dns_host, dns_timeout) => ms,
                };
                let snapshot = build_snapshot(link.read(), &router, &internet, dns_ms);
                if cancel.is_cancelled() {
                    return;
                }
                tracing::debug!(
                    router_ping = ?snapshot.router_ping,
                    internet_ping = ?snapshot.internet_ping,
                    incident = ?snapshot.incident.map(|i| i.kind),
                    "network snapshot"
                );
                cache.set_network(Some(snapshot));
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "network health monitor started");
        self.running = Some(token);
    }

    fn stop(&mut self) {
        let Some(token) = self.running.take() else {
            return;
        };
        token.cancel();
        self.router.stop();
        self.internet.stop();
        tracing::info!("network health monitor stopped");
    }
}

impl Drop for NetworkHealthMonitor {
    fn drop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IncidentType;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn idle_reader() -> ProbeReader {
        PingEngine::new(ProbeTarget::new("127.0.0.1", 1)).reader()
    }

    #[test]
    fn fresh_probes_report_unknown_not_outage() {
        let link = LinkAttributes {
            router_ip: Some("192.168.1.1".into()),
            band: Some(Band::Ghz2_4),
            ..Default::default()
        };
        let snap = build_snapshot(link, &idle_reader(), &idle_reader(), Some(10.0));
        assert_eq!(snap.router_loss, None);
        assert_eq!(snap.internet_loss, None);
        assert_eq!(snap.router_ping, None);
        assert!(snap.incident.is_none());
        assert_eq!(snap.router_ip.as_deref(), Some("192.168.1.1"));
    }

    #[tokio::test]
    async fn dns_lookup_of_localhost_is_measured() {
        let ms = measure_dns("localhost", Duration::from_secs(2)).await;
        assert!(ms.is_some());
    }

    #[tokio::test]
    async fn dns_failure_reads_as_none() {
        let ms = measure_dns("no-such-host.invalid", Duration::from_secs(2)).await;
        assert_eq!(ms, None);
    }

    #[tokio::test]
    async fn zero_interval_monitor_keeps_publishing() {
        let cache = MetricsCache::new();
        let root = CancellationToken::new();
        let mut monitor = NetworkHealthMonitor::with_probes(
            PingEngine::new(ProbeTarget::new("127.0.0.1", 1)),
            PingEngine::new(ProbeTarget::new("127.0.0.1", 1)),
            Arc::new(NoRadio),
            "localhost".into(),
            Duration::from_secs(2),
            cache.clone(),
            root.clone(),
        );
        monitor.start(Duration::ZERO);

        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.network().is_none() {
            assert!(Instant::now() < deadline, "no snapshot published");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        monitor.stop();
    }

    #[tokio::test]
    async fn monitor_publishes_snapshots_and_classifies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 16];
                    while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                });
            }
        });
        // internet target refuses: router healthy, upstream dead
        let dead_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let cache = MetricsCache::new();
        let root = CancellationToken::new();
        let delay = Duration::from_millis(10);
        let mut monitor = NetworkHealthMonitor::with_probes(
            PingEngine::new(ProbeTarget::new("127.0.0.1", port)).with_reconnect_delay(delay),
            PingEngine::new(ProbeTarget::new("127.0.0.1", dead_port)).with_reconnect_delay(delay),
            Arc::new(NoRadio),
            "localhost".into(),
            Duration::from_secs(2),
            cache.clone(),
            root.clone(),
        );
        monitor.start(Duration::from_millis(20));

        let deadline = Instant::now() + Duration::from_secs(5);
        let incident = loop {
            if let Some(kind) = cache.network().and_then(|s| s.incident).map(|i| i.kind) {
                break kind;
            }
            assert!(Instant::now() < deadline, "no classified snapshot");
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        monitor.stop();

        assert_eq!(incident, IncidentType::InternetOutage);
        let snap = cache.network().unwrap();
        assert_eq!(snap.internet_ping, None);
        assert_eq!(snap.internet_loss, Some(100.0));
    }
}
