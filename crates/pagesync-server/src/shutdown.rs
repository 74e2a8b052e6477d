//! Server shutdown: refuse new upgrades, let open connections finish
//! dispatching what they already read, then stop the background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TrackedFuture;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Shared between the router, every connection task and the server handle.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancelled when shutdown starts; connections watch it to close.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection so [`drain`](Self::drain) waits for it.
    pub fn track_connection<F: Future<Output = ()>>(&self, connection: F) -> TrackedFuture<F> {
        self.connections.track_future(connection)
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Cancel the token, wait for every tracked connection and then for
    /// `background`, all within `timeout`.
    ///
    /// Returns `false` if the deadline passed first; remaining background
    /// tasks are aborted in that case.
    pub async fn drain(&self, background: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.token.cancel();
        self.connections.close();
        info!(
            connections = self.connections.len(),
            timeout_secs = timeout.as_secs_f64(),
            "draining connections"
        );

        let aborts: Vec<_> = background.iter().map(JoinHandle::abort_handle).collect();
        let drained = async {
            self.connections.wait().await;
            let _ = futures::future::join_all(background).await;
        };

        if tokio::time::timeout(timeout, drained).await.is_ok() {
            info!("shutdown complete");
            true
        } else {
            warn!(
                open_connections = self.connections.len(),
                "shutdown timed out after {timeout:?}"
            );
            for abort in aborts {
                abort.abort();
            }
            false
        }
    }
}
