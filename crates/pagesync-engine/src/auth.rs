//! Authentication gate for page traffic.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use pagesync_core::{HandlerError, ServerMessage};
use serde_json::Value;
use tracing::info;

use crate::handler::guarded;
use crate::metrics::AUTH_TOTAL;
use crate::relay::CommitRelay;
use crate::session::Session;

/// One credential check. Receives the client's `auth` payload verbatim.
#[async_trait]
pub trait AuthPredicate: Send + Sync {
    async fn check(&self, credentials: Value) -> Result<bool, HandlerError>;
}

#[async_trait]
impl<F, Fut> AuthPredicate for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HandlerError>> + Send,
{
    async fn check(&self, credentials: Value) -> Result<bool, HandlerError> {
        (self)(credentials).await
    }
}

/// Why a handshake was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth predicate #{index} rejected the credentials")]
    Rejected { index: usize },

    #[error("auth predicate #{index} failed: {source}")]
    Failed {
        index: usize,
        #[source]
        source: HandlerError,
    },
}

/// Ordered list of auth predicates. With no predicates registered the gate is
/// inert and every session is authorized.
#[derive(Default)]
pub struct AuthGate {
    predicates: Vec<Arc<dyn AuthPredicate>>,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_predicate(&mut self, predicate: impl AuthPredicate + 'static) {
        self.predicates.push(Arc::new(predicate));
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Run predicates in registration order. The first one that returns
    /// `false`, errors or panics ends the evaluation.
    pub async fn check(&self, credentials: &Value) -> Result<(), AuthError> {
        for (index, predicate) in self.predicates.iter().enumerate() {
            match guarded(predicate.check(credentials.clone())).await {
                Ok(true) => {}
                Ok(false) => return Err(AuthError::Rejected { index }),
                Err(source) => return Err(AuthError::Failed { index, source }),
            }
        }
        Ok(())
    }

    /// Handle an `auth` handshake: record the outcome on the session and
    /// acknowledge it to the client with `auth(bool)`.
    pub async fn evaluate(&self, session: &Session, credentials: Value, relay: &CommitRelay) -> bool {
        let verified = match self.check(&credentials).await {
            Ok(()) => true,
            Err(err) => {
                info!(session_id = %session.id(), error = %err, "auth rejected");
                false
            }
        };
        session.set_verified(verified);
        counter!(AUTH_TOTAL, "result" => if verified { "accepted" } else { "rejected" }).increment(1);
        if verified {
            info!(session_id = %session.id(), "auth accepted");
        }
        let _ = relay.send(session.id(), &ServerMessage::Auth(verified));
        verified
    }

    pub fn is_authorized(&self, session: &Session) -> bool {
        self.predicates.is_empty() || session.is_verified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingOutbound;
    use assert_matches::assert_matches;
    use pagesync_core::SessionId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token_gate(expected: &'static str) -> AuthGate {
        let mut gate = AuthGate::new();
        gate.add_predicate(move |creds: Value| async move { Ok::<_, HandlerError>(creds["token"] == expected) });
        gate
    }

    fn connected(out: &RecordingOutbound) -> Session {
        let id = SessionId::new();
        out.connect(id.clone());
        Session::new(id)
    }

    #[tokio::test]
    async fn empty_gate_authorizes_everyone() {
        let gate = AuthGate::new();
        let session = Session::new(SessionId::new());
        assert!(gate.is_empty());
        assert!(gate.is_authorized(&session));
        assert!(gate.check(&json!(null)).await.is_ok());
    }

    #[tokio::test]
    async fn gate_with_predicates_requires_verification() {
        let gate = token_gate("secret");
        let session = Session::new(SessionId::new());
        assert!(!gate.is_authorized(&session));
    }

    #[tokio::test]
    async fn evaluate_success_verifies_and_acks() {
        let out = Arc::new(RecordingOutbound::default());
        let relay = CommitRelay::new(out.clone());
        let session = connected(&out);
        let gate = token_gate("secret");

        assert!(gate.evaluate(&session, json!({"token": "secret"}), &relay).await);
        assert!(session.is_verified());
        assert!(gate.is_authorized(&session));
        assert_eq!(out.messages_for(session.id()), vec![ServerMessage::Auth(true)]);
    }

    #[tokio::test]
    async fn evaluate_failure_clears_verification() {
        let out = Arc::new(RecordingOutbound::default());
        let relay = CommitRelay::new(out.clone());
        let session = connected(&out);
        let gate = token_gate("secret");

        assert!(gate.evaluate(&session, json!({"token": "secret"}), &relay).await);
        assert!(!gate.evaluate(&session, json!({"token": "bad"}), &relay).await);
        assert!(!session.is_verified());
        assert_eq!(
            out.messages_for(session.id()),
            vec![ServerMessage::Auth(true), ServerMessage::Auth(false)]
        );
    }

    #[tokio::test]
    async fn first_rejection_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut gate = AuthGate::new();
        gate.add_predicate(|_: Value| async { Ok::<_, HandlerError>(true) });
        gate.add_predicate(|_: Value| async { Ok::<_, HandlerError>(false) });
        let counter = calls.clone();
        gate.add_predicate(move |_: Value| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(true)
            }
        });

        assert_matches!(gate.check(&json!({})).await, Err(AuthError::Rejected { index: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn predicate_error_is_rejection() {
        let mut gate = AuthGate::new();
        gate.add_predicate(|_: Value| async { Err::<bool, _>(HandlerError::failed("db down")) });
        assert_matches!(
            gate.check(&json!({})).await,
            Err(AuthError::Failed { index: 0, source: HandlerError::Failed(msg) }) if msg == "db down"
        );
    }

    #[tokio::test]
    async fn predicate_panic_is_rejection() {
        async fn explode(_: Value) -> Result<bool, HandlerError> {
            panic!("predicate bug")
        }
        let out = Arc::new(RecordingOutbound::default());
        let relay = CommitRelay::new(out.clone());
        let session = connected(&out);
        let mut gate = AuthGate::new();
        gate.add_predicate(explode);

        assert!(!gate.evaluate(&session, json!({}), &relay).await);
        assert_eq!(out.messages_for(session.id()), vec![ServerMessage::Auth(false)]);
    }

    #[tokio::test]
    async fn predicates_run_in_registration_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut gate = AuthGate::new();
        for i in 0..3 {
            let order = order.clone();
            gate.add_predicate(move |_: Value| {
                let order = order.clone();
                async move {
                    order.lock().push(i);
                    Ok::<_, HandlerError>(true)
                }
            });
        }
        assert!(gate.check(&json!({})).await.is_ok());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(gate.len(), 3);
    }
}
