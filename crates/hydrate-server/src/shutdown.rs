//! Graceful shutdown coordination via `CancellationToken`.
//!
//! One token fans out to the HTTP server, the broadcast scheduler and every
//! connection handler. Connection tasks are tracked so shutdown can wait for
//! their teardown (unregister, close frame) before the process exits.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default time shutdown waits for tasks before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across all gateway tasks.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection future so shutdown waits for it.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.connections.track_future(future)
    }

    /// Connection tasks still running.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Cancel everything and wait for it to wind down.
    ///
    /// Waits up to `timeout` (default 10 s) for `handles` and every tracked
    /// connection. Returns `false` if the wait timed out.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.connections.close();
        info!(
            task_count = handles.len(),
            connections = self.connection_count(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.connections.wait().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
            return false;
        }
        info!("shutdown complete");
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
