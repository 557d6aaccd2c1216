use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::window::SampleWindow;

/// Delay between the end of one round and the next connect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Content is never inspected by the peer; only completion matters.
const PROBE_PAYLOAD: [u8; 1] = [0x00];

/// Connection lifecycle of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Not running, or waiting for the reconnect delay.
    Idle,
    Connecting,
    Ready,
    Sending,
    /// Last round failed; reconnect pending.
    Failed,
}

/// Transient probe failure. Only ever recorded, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("send failed: {0}")]
    Send(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
struct ProbeShared {
    window: SampleWindow,
    state: ProbeState,
}

/// Cheap read handle onto a probe's derived state.
/// Reads never wait on network I/O; the lock is only held for copies.
#[derive(Debug, Clone)]
pub struct ProbeReader {
    shared: Arc<Mutex<ProbeShared>>,
}

impl ProbeReader {
    fn lock(&self) -> MutexGuard<'_, ProbeShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_ping(&self) -> Option<f64> {
        self.lock().window.current_ping()
    }

    pub fn average_ping(&self) -> Option<f64> {
        self.lock().window.average_ping()
    }

    pub fn jitter(&self) -> Option<f64> {
        self.lock().window.jitter()
    }

    pub fn packet_loss(&self) -> f64 {
        self.lock().window.packet_loss()
    }

    pub fn state(&self) -> ProbeState {
        self.lock().state
    }

    pub fn attempts(&self) -> u64 {
        self.lock().window.attempts()
    }

    pub fn failures(&self) -> u64 {
        self.lock().window.failures()
    }

    /// Apply `f` only while `liveness` is uncancelled. Checked under the
    /// lock so a late completion can never write after `stop()`.
    fn update_if_live(&self, liveness: &CancellationToken, f: impl FnOnce(&mut ProbeShared)) {
        let mut shared = self.lock();
        if !liveness.is_cancelled() {
            f(&mut shared);
        }
    }
}

/// Reconnecting TCP latency probe against one target.
///
/// Owns exactly one background loop while running. The loop is the only
/// writer of the sample window; readers go through [`ProbeReader`].
pub struct PingEngine {
    target: ProbeTarget,
    reader: ProbeReader,
    reconnect_delay: Duration,
    /// Liveness flag of the current loop.
    running: Option<CancellationToken>,
}

impl PingEngine {
    pub fn new(target: ProbeTarget) -> Self {
        Self {
            target,
            reader: ProbeReader {
                shared: Arc::new(Mutex::new(ProbeShared {
                    window: SampleWindow::new(),
                    state: ProbeState::Idle,
                })),
            },
            reconnect_delay: RECONNECT_DELAY,
            running: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    /// Begin the reconnect loop. No-op if already running.
    /// The loop also ends when `parent` is cancelled.
    pub fn start(&mut self, parent: &CancellationToken) {
        if self.running.is_some() {
            return;
        }
        let token = parent.child_token();
        tokio::spawn(run_loop(
            self.target.clone(),
            self.reader.clone(),
            self.reconnect_delay,
            token.clone(),
        ));
        tracing::debug!(target = %self.target, "probe started");
        self.running = Some(token);
    }

    /// Cancel the loop and drop any open connection. Idempotent.
    pub fn stop(&mut self) {
        let Some(token) = self.running.take() else {
            return;
        };
        token.cancel();
        self.reader.lock().state = ProbeState::Idle;
        tracing::debug!(target = %self.target, "probe stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn reader(&self) -> ProbeReader {
        self.reader.clone()
    }

    pub fn current_ping(&self) -> Option<f64> {
        self.reader.current_ping()
    }

    pub fn average_ping(&self) -> Option<f64> {
        self.reader.average_ping()
    }

    pub fn jitter(&self) -> Option<f64> {
        self.reader.jitter()
    }

    pub fn packet_loss(&self) -> f64 {
        self.reader.packet_loss()
    }

    pub fn state(&self) -> ProbeState {
        self.reader.state()
    }
}

impl Drop for PingEngine {
    fn drop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

async fn run_loop(
    target: ProbeTarget,
    reader: ProbeReader,
    reconnect_delay: Duration,
    token: CancellationToken,
) {
    loop {
        reader.update_if_live(&token, |s| s.state = ProbeState::Connecting);

        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            outcome = probe_once(&target, &reader, &token) => outcome,
        };

        match outcome {
            Ok(latency_ms) => {
                reader.update_if_live(&token, |s| {
                    s.window.record_success(latency_ms, Instant::now());
                    s.state = ProbeState::Idle;
                });
                tracing::trace!(target = %target, latency_ms, "probe sample");
            }
            Err(e) => {
                reader.update_if_live(&token, |s| {
                    s.window.record_failure();
                    s.state = ProbeState::Failed;
                });
                tracing::debug!(target = %target, error = %e, "probe round failed");
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

/// One connect → send → close round. Returns send latency in ms.
async fn probe_once(
    target: &ProbeTarget,
    reader: &ProbeReader,
    token: &CancellationToken,
) -> Result<f64, ProbeError> {
    let mut stream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(ProbeError::Connect)?;
    reader.update_if_live(token, |s| s.state = ProbeState::Ready);

    reader.update_if_live(token, |s| s.state = ProbeState::Sending);
    let started = Instant::now();
    stream
        .write_all(&PROBE_PAYLOAD)
        .await
        .map_err(ProbeError::Send)?;
    stream.flush().await.map_err(ProbeError::Send)?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    // best-effort close; the round already succeeded
    let _ = stream.shutdown().await;
    Ok(latency_ms)
}
