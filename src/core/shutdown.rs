use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Graceful shutdown coordinator.
///
/// Uses `CancellationToken` to broadcast shutdown signals to all tasks.
/// Shutdown sequence:
/// 1. Set CancellationToken (broadcast to all tasks)
/// 2. Stop accepting new HTTP connections
/// 3. Drain in-flight requests, including open video streams
///    (timeout: `HTTP_DRAIN_TIMEOUT_SECS`)
/// 4. Exit with code 0, or 1 if the drain timed out
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a clone of the cancellation token for use by tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown for all tasks listening on this token.
    pub fn trigger_shutdown(&self) {
        info!("shutdown signal received, broadcasting to all tasks");
        self.token.cancel();
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT) and trigger coordinated shutdown.
    pub async fn wait_for_signal_and_shutdown(&self) {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
                        _ = sigterm.recv() => info!("received SIGTERM"),
                        _ = self.token.cancelled() => return,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, listening for SIGINT only");
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
                        _ = self.token.cancelled() => return,
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
                _ = self.token.cancelled() => return,
            }
        }

        self.trigger_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Time allowed for in-flight requests to finish after shutdown starts.
pub const HTTP_DRAIN_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_all_tokens() {
        let shutdown = ShutdownCoordinator::new();
        let a = shutdown.token();
        let b = shutdown.clone().token();
        assert!(!a.is_cancelled());

        shutdown.trigger_shutdown();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_returns_when_already_cancelled() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.trigger_shutdown();
        // Returns immediately instead of waiting for a signal.
        shutdown.wait_for_signal_and_shutdown().await;
    }
}
