//! Commit fan-out over the namespace transport.

use std::sync::Arc;

use metrics::counter;
use pagesync_core::{ServerMessage, SessionId};
use serde_json::Value;
use tracing::debug;

use crate::metrics::COMMITS_TOTAL;
use crate::outbound::Outbound;

/// Sends commits to one session or to every session in the namespace.
///
/// Delivery is fire-and-forget and at-most-once: commits addressed to a
/// session that is not connected are dropped, never buffered.
#[derive(Clone)]
pub struct CommitRelay {
    outbound: Arc<dyn Outbound>,
}

impl CommitRelay {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self { outbound }
    }

    /// Root-level commit. With `target` absent every connected session
    /// receives it; otherwise only the matching session does.
    ///
    /// Returns the number of sessions the commit was handed to.
    pub fn commit(&self, name: impl Into<String>, payload: Value, target: Option<&SessionId>) -> usize {
        let message = ServerMessage::commit(name, payload);
        match target {
            Some(session) => {
                counter!(COMMITS_TOTAL, "scope" => "unicast").increment(1);
                let delivered = self.outbound.send_to(session, &message);
                if !delivered {
                    debug!(session_id = %session, "commit target not connected, dropped");
                }
                usize::from(delivered)
            }
            None => {
                counter!(COMMITS_TOTAL, "scope" => "broadcast").increment(1);
                let recipients = self.outbound.broadcast(&message);
                debug!(recipients, "broadcast commit");
                recipients
            }
        }
    }

    pub fn broadcast(&self, name: impl Into<String>, payload: Value) -> usize {
        self.commit(name, payload, None)
    }

    pub fn commit_to(&self, target: &SessionId, name: impl Into<String>, payload: Value) -> bool {
        self.commit(name, payload, Some(target)) == 1
    }

    /// Unicast an arbitrary protocol message (auth acks, resets, page commits).
    pub(crate) fn send(&self, session: &SessionId, message: &ServerMessage) -> bool {
        self.outbound.send_to(session, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingOutbound;
    use serde_json::json;

    fn relay_with(ids: &[&str]) -> (CommitRelay, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::default());
        for id in ids {
            outbound.connect(SessionId::from_raw(*id));
        }
        (CommitRelay::new(outbound.clone()), outbound)
    }

    #[test]
    fn broadcast_reaches_every_session() {
        let (relay, out) = relay_with(&["a", "b", "c"]);
        let n = relay.commit("changeUser", json!("boen"), None);
        assert_eq!(n, 3);
        for id in ["a", "b", "c"] {
            assert_eq!(
                out.messages_for(&SessionId::from_raw(id)),
                vec![ServerMessage::commit("changeUser", json!("boen"))]
            );
        }
    }

    #[test]
    fn targeted_commit_reaches_only_target() {
        let (relay, out) = relay_with(&["a", "b"]);
        assert!(relay.commit_to(&SessionId::from_raw("b"), "setName", json!("x")));
        assert!(out.messages_for(&SessionId::from_raw("a")).is_empty());
        assert_eq!(out.messages_for(&SessionId::from_raw("b")).len(), 1);
    }

    #[test]
    fn commit_to_disconnected_session_is_dropped() {
        let (relay, out) = relay_with(&["a"]);
        let n = relay.commit("x", json!(1), Some(&SessionId::from_raw("gone")));
        assert_eq!(n, 0);
        assert!(out.all().is_empty());
    }

    #[test]
    fn broadcast_with_no_sessions() {
        let (relay, out) = relay_with(&[]);
        assert_eq!(relay.broadcast("x", json!(null)), 0);
        assert!(out.all().is_empty());
    }
}
