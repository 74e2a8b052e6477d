//! Inbound and outbound message kinds of the pagesync protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;

/// Client → server: credential handshake. Server → client: handshake result.
pub const EVENT_AUTH: &str = "auth";
/// Client → server: lifecycle envelope. Server → client: page-scoped commit.
pub const EVENT_PAGE_SYNC: &str = "page:sync";
/// Client → server: custom page event.
pub const EVENT_PAGE_EVENT: &str = "page:event";
/// Server → client: root-level commit.
pub const EVENT_COMMIT: &str = "commit";
/// Server → client: reset signal naming pages to discard.
pub const EVENT_RESET: &str = "*";
/// Server → client: the connection's session id, sent once after upgrade.
pub const EVENT_CONNECT: &str = "connect";

/// A page name together with the client's route payload for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: String,
    #[serde(default)]
    pub payload: Value,
}

impl PageInfo {
    pub fn new(page: impl Into<String>, payload: Value) -> Self {
        Self {
            page: page.into(),
            payload,
        }
    }
}

/// Lifecycle transitions announced by a client in one `page:sync` message.
///
/// Fields are processed enter → leave → update when several are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enter: Option<PageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave: Option<PageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PageInfo>,
}

impl LifecycleEnvelope {
    pub fn enter(page: impl Into<String>, payload: Value) -> Self {
        Self::default().with_enter(page, payload)
    }

    pub fn leave(page: impl Into<String>, payload: Value) -> Self {
        Self::default().with_leave(page, payload)
    }

    pub fn update(page: impl Into<String>, payload: Value) -> Self {
        Self::default().with_update(page, payload)
    }

    pub fn with_enter(mut self, page: impl Into<String>, payload: Value) -> Self {
        self.enter = Some(PageInfo::new(page, payload));
        self
    }

    pub fn with_leave(mut self, page: impl Into<String>, payload: Value) -> Self {
        self.leave = Some(PageInfo::new(page, payload));
        self
    }

    pub fn with_update(mut self, page: impl Into<String>, payload: Value) -> Self {
        self.update = Some(PageInfo::new(page, payload));
        self
    }

    /// Distinct, non-empty page names mentioned by this envelope in
    /// processing order.
    pub fn pages(&self) -> Vec<String> {
        let mut pages: Vec<String> = Vec::new();
        for info in [&self.enter, &self.leave, &self.update].into_iter().flatten() {
            if !info.page.is_empty() && !pages.contains(&info.page) {
                pages.push(info.page.clone());
            }
        }
        pages
    }

    pub fn is_empty(&self) -> bool {
        self.enter.is_none() && self.leave.is_none() && self.update.is_none()
    }
}

/// A named custom event raised by a client against one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomEventEnvelope {
    pub event: String,
    pub page: PageInfo,
    #[serde(default)]
    pub data: Value,
}

impl CustomEventEnvelope {
    pub fn new(event: impl Into<String>, page: PageInfo, data: Value) -> Self {
        Self {
            event: event.into(),
            page,
            data,
        }
    }

    pub fn pages(&self) -> Vec<String> {
        if self.page.page.is_empty() {
            Vec::new()
        } else {
            vec![self.page.page.clone()]
        }
    }
}

/// Decoded client → server message.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Opaque credentials, forwarded verbatim to every auth predicate.
    Auth(Value),
    PageSync(LifecycleEnvelope),
    PageEvent(CustomEventEnvelope),
}

impl ClientMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::Auth(_) => EVENT_AUTH,
            Self::PageSync(_) => EVENT_PAGE_SYNC,
            Self::PageEvent(_) => EVENT_PAGE_EVENT,
        }
    }
}

/// Server → client message.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Connect { session_id: SessionId },
    Auth(bool),
    /// Root-level commit (unicast or broadcast).
    Commit { name: String, payload: Value },
    /// Page-scoped commit, always unicast to the session that owns the page.
    PageSync {
        page: String,
        name: String,
        payload: Value,
    },
    /// Discard client state for these pages.
    Reset { pages: Vec<String> },
}

impl ServerMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::Connect { .. } => EVENT_CONNECT,
            Self::Auth(_) => EVENT_AUTH,
            Self::Commit { .. } => EVENT_COMMIT,
            Self::PageSync { .. } => EVENT_PAGE_SYNC,
            Self::Reset { .. } => EVENT_RESET,
        }
    }

    pub fn commit(name: impl Into<String>, payload: Value) -> Self {
        Self::Commit {
            name: name.into(),
            payload,
        }
    }

    pub fn reset(pages: Vec<String>) -> Self {
        Self::Reset { pages }
    }
}
