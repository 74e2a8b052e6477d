//! The engine instance: registry, auth gate and commit relay.

use std::sync::Arc;

use pagesync_core::SessionId;
use serde_json::Value;

use crate::auth::{AuthGate, AuthPredicate};
use crate::dispatcher::SessionDispatcher;
use crate::outbound::Outbound;
use crate::registry::{PageBundle, PageRegistry};
use crate::relay::CommitRelay;
use crate::session::Session;

/// Explicitly constructed protocol engine.
///
/// Pages and auth predicates are registered through `&mut self` before the
/// engine is shared; once wrapped in an `Arc` it is read-only and one
/// [`SessionDispatcher`] is created per connection.
pub struct Engine {
    registry: PageRegistry,
    auth: AuthGate,
    relay: CommitRelay,
}

impl Engine {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            registry: PageRegistry::new(),
            auth: AuthGate::new(),
            relay: CommitRelay::new(outbound),
        }
    }

    /// Register (or replace) the bundle for a page.
    pub fn page(&mut self, bundle: PageBundle) -> &mut Self {
        if self.registry.register(bundle).is_some() {
            tracing::debug!("page bundle replaced");
        }
        self
    }

    /// Append an auth predicate. Registering any predicate turns the gate on.
    pub fn auth(&mut self, predicate: impl AuthPredicate + 'static) -> &mut Self {
        self.auth.add_predicate(predicate);
        self
    }

    /// Root-level commit: broadcast when `target` is `None`.
    pub fn commit(&self, name: impl Into<String>, payload: Value, target: Option<&SessionId>) -> usize {
        self.relay.commit(name, payload, target)
    }

    pub fn relay(&self) -> &CommitRelay {
        &self.relay
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn auth_gate(&self) -> &AuthGate {
        &self.auth
    }

    /// Install a dispatcher for a newly connected session.
    pub fn dispatcher(self: &Arc<Self>, session: Arc<Session>) -> SessionDispatcher {
        SessionDispatcher::new(Arc::clone(self), session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingOutbound;
    use pagesync_core::{HandlerError, ServerMessage};
    use serde_json::json;

    #[test]
    fn register_pages_and_auth() {
        let mut engine = Engine::new(Arc::new(RecordingOutbound::default()));
        engine
            .page(PageBundle::builder("foo").build().unwrap())
            .page(PageBundle::builder("bar").keep(true).build().unwrap())
            .auth(|_: Value| async { Ok::<_, HandlerError>(true) });
        assert_eq!(engine.registry().names(), vec!["bar", "foo"]);
        assert_eq!(engine.auth_gate().len(), 1);
    }

    #[test]
    fn root_commit_broadcast_and_target() {
        let out = Arc::new(RecordingOutbound::default());
        let a = SessionId::from_raw("a");
        let b = SessionId::from_raw("b");
        out.connect(a.clone());
        out.connect(b.clone());
        let engine = Engine::new(out.clone());

        assert_eq!(engine.commit("tick", json!(1), None), 2);
        assert_eq!(engine.commit("only_b", json!(2), Some(&b)), 1);

        assert_eq!(out.messages_for(&a), vec![ServerMessage::commit("tick", json!(1))]);
        assert_eq!(
            out.messages_for(&b),
            vec![
                ServerMessage::commit("tick", json!(1)),
                ServerMessage::commit("only_b", json!(2))
            ]
        );
    }
}
