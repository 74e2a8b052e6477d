//! Per-connection session state observed by the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pagesync_core::SessionId;

/// One live client connection and its authentication status.
///
/// Created by the transport on connect and dropped on disconnect; the engine
/// only reads and updates the verified flag.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    verified: AtomicBool,
    connected_at: Instant,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            verified: AtomicBool::new(false),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Outcome of the most recent auth handshake (`false` before any).
    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    pub(crate) fn set_verified(&self, verified: bool) {
        self.verified.store(verified, Ordering::Release);
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
