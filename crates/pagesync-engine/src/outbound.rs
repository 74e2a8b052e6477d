//! Transport seam consumed by the engine.

use pagesync_core::{ServerMessage, SessionId};

/// Delivery side of the namespace the engine is installed on.
///
/// Implementations are best-effort and must not block: a message that cannot
/// be delivered right now is dropped.
pub trait Outbound: Send + Sync {
    /// Deliver to one connected session. Returns `false` when no such session
    /// is connected or its send queue refused the message.
    fn send_to(&self, session: &SessionId, message: &ServerMessage) -> bool;

    /// Deliver to every session joined to the namespace. Returns the number
    /// of sessions that accepted the message.
    fn broadcast(&self, message: &ServerMessage) -> usize;
}
