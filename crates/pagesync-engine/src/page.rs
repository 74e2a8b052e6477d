//! Page-scoped commit capability.

use pagesync_core::{ServerMessage, SessionId};
use serde_json::Value;

use crate::relay::CommitRelay;

/// Commit capability bound to one (session, page) pair.
///
/// The binding is fixed when the dispatcher builds the handle; nothing a
/// handler passes to [`PageHandle::commit`] can redirect it to another session.
#[derive(Clone)]
pub struct PageHandle {
    session: SessionId,
    page: String,
    relay: CommitRelay,
}

impl PageHandle {
    pub(crate) fn new(session: SessionId, page: String, relay: CommitRelay) -> Self {
        Self {
            session,
            page,
            relay,
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// Send a page-local mutation to the owning session as
    /// `page:sync(page, name, payload)`.
    pub fn commit(&self, name: impl Into<String>, payload: Value) -> bool {
        let message = ServerMessage::PageSync {
            page: self.page.clone(),
            name: name.into(),
            payload,
        };
        self.relay.send(&self.session, &message)
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("session", &self.session)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}
