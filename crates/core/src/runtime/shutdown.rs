use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Process-wide shutdown via a CancellationToken.
/// SIGTERM or Ctrl+C cancels the token; every task holds a child of it.
#[derive(Debug)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The cancellation token that all tasks should monitor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that listens for OS signals and triggers cancellation.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to register SIGTERM handler");
                            return;
                        }
                    };
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating shutdown"),
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, initiating shutdown"),
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, initiating shutdown"),
                }
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}
